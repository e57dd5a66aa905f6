//! Request id allocation and response matching.

use std::collections::HashMap;

use crate::error::{GatewayError, Result};

const DEFAULT_PREFIX: &str = "req";

/// Tracks in-flight requests by id.
///
/// The counter survives [`clear_all`](Self::clear_all), so ids are never
/// reused for the lifetime of the correlator.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    counter: u64,
    pending: HashMap<String, String>,
}

impl RequestCorrelator {
    /// Empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id with `prefix`.
    pub fn next_request_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }

    /// Allocate an id and record `method` as pending under it.
    pub fn register(&mut self, method: &str) -> String {
        self.register_with_prefix(DEFAULT_PREFIX, method)
    }

    /// Like [`register`](Self::register) with a custom id prefix.
    pub fn register_with_prefix(&mut self, prefix: &str, method: &str) -> String {
        let id = self.next_request_id(prefix);
        self.pending.insert(id.clone(), method.to_string());
        id
    }

    /// Remove and return the method pending under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RequestNotFound`] if nothing is pending under `id`.
    pub fn resolve(&mut self, id: &str) -> Result<String> {
        self.pending
            .remove(id)
            .ok_or_else(|| GatewayError::RequestNotFound(id.to_string()))
    }

    /// Drop a registration without resolving it.
    pub fn forget(&mut self, id: &str) {
        self.pending.remove(id);
    }

    /// Whether `id` is pending.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Discard every pending request.
    pub fn clear_all(&mut self) {
        self.pending.clear();
    }
}
