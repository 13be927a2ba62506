//! Typed sync events.
//!
//! The engine publishes these over a broadcast channel; observers subscribe
//! instead of registering string-keyed callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Up,
    Down,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Up => f.write_str("up"),
            SyncDirection::Down => f.write_str("down"),
        }
    }
}

/// The closed set of events a sync engine instance can emit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    SyncStart {
        direction: SyncDirection,
    },
    SyncComplete {
        direction: SyncDirection,
        /// Remote metadata version after the session, when one was written
        /// or applied. Absent for an "already up to date" short-circuit.
        version: Option<i64>,
        up_to_date: bool,
    },
    SyncError {
        direction: SyncDirection,
        message: String,
    },
    MigrationStart,
    MigrationComplete {
        /// Items merged in from the anonymous profile, per collection.
        merged: usize,
    },
    MigrationError {
        message: String,
    },
}
