//! Shared registries for the three workers.
//!
//! The subscription and command listeners write, the transmission loop
//! reads. Both registries are plain mutex-guarded values with
//! last-writer-wins overwrites; locks are held only long enough to copy the
//! value in or out and never across an await point.

use std::net::SocketAddr;
use std::sync::Mutex;

/// Command token the actuation layer boots with.
pub const INITIAL_COMMAND: &str = "STOP";

/// The single current video subscriber.
///
/// Empty until the first subscribe (or bootstrap command) datagram arrives;
/// afterwards only ever replaced, never cleared.
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    current: Mutex<Option<SocketAddr>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current destination, if any subscriber has registered.
    pub fn get(&self) -> Option<SocketAddr> {
        *self.current.lock().unwrap()
    }

    /// Unconditionally replaces the destination (last writer wins).
    pub fn set(&self, addr: SocketAddr) {
        *self.current.lock().unwrap() = Some(addr);
    }

    /// Sets the destination only when none is registered yet.
    ///
    /// This is the command-channel bootstrap: check and set happen under one
    /// lock so two racing writers cannot both believe they seeded it.
    /// Returns whether the write happened.
    pub fn set_if_absent(&self, addr: SocketAddr) -> bool {
        let mut current = self.current.lock().unwrap();
        if current.is_none() {
            *current = Some(addr);
            true
        } else {
            false
        }
    }
}

/// Latest accepted steering command token.
#[derive(Debug)]
pub struct CommandRegistry {
    current: Mutex<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(INITIAL_COMMAND.to_string()),
        }
    }

    pub fn get(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    /// Replaces the current command (last writer wins).
    pub fn set(&self, token: &str) {
        *self.current.lock().unwrap() = token.to_string();
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
