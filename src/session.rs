//! Session manager (C3): one monotonic, never-zero counter per
//! (service_id, method_id), safe under concurrent callers.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey {
    service_id: u16,
    method_id: u16,
}

/// Issues session ids in `[1, 0xFFFF]`, wrapping past `0xFFFF` back to `1`
/// (never `0`), independently for every (service, method) pair.
#[derive(Debug, Default)]
pub struct SessionManager {
    counters: Mutex<HashMap<MethodKey, u16>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next session id for `(service_id, method_id)` and
    /// advances that method's counter.
    pub fn next_session_id(&self, service_id: u16, method_id: u16) -> u16 {
        let key = MethodKey { service_id, method_id };
        let mut counters = self.counters.lock().unwrap();
        let current = counters.entry(key).or_insert(0);
        *current = match *current {
            0 => 1,
            0xffff => 1,
            n => n + 1,
        };
        *current
    }
}
