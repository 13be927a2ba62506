use cleansheet_crypto::{CryptoProvider, DeviceCrypto, DeviceSecret};
use proptest::prelude::*;

proptest! {
    // KDF per case keeps this slow; a small case count is enough to cover
    // interesting plaintext shapes.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn device_roundtrip_preserves_arbitrary_strings(text in ".{0,256}") {
        let crypto = DeviceCrypto::new(DeviceSecret::generate());
        let token = crypto.encrypt(&text).unwrap();
        prop_assert_eq!(crypto.decrypt(&token).unwrap(), text);
    }

    #[test]
    fn password_roundtrip_preserves_arbitrary_strings(
        text in ".{0,256}",
        password in "[a-zA-Z0-9]{8,24}",
    ) {
        let crypto = DeviceCrypto::new(DeviceSecret::generate());
        let token = crypto.encrypt_with_password(&text, &password).unwrap();
        prop_assert_eq!(crypto.decrypt_with_password(&token, &password).unwrap(), text);
    }
}
