//! Registry of active call sessions.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::{RelayError, RelayResult};
use super::session::{CallSession, CallStatus};

/// Active sessions keyed by call id.
///
/// Cloning shares the underlying map. Operations on different call ids do not
/// contend beyond the map's shard locks.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<CallSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Fails if the call id is already registered.
    pub fn register(&self, session: Arc<CallSession>) -> RelayResult<()> {
        match self.sessions.entry(session.call_id().to_string()) {
            Entry::Occupied(entry) => Err(RelayError::Protocol(format!(
                "call {} is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.remove(call_id).map(|(_, session)| session)
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.sessions.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of registered call ids.
    pub fn call_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of call id to current status.
    pub fn list_statuses(&self) -> HashMap<String, CallStatus> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }
}
