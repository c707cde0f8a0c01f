//! Registry of request ids currently being worked on.

use hoist_core::{Error, RequestId, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Ids of accepted, unfinished requests. Each id names a working directory,
/// so two live requests must never share one.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<RequestId>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, failing with `Conflict` if it is already active.
    pub fn claim(&self, id: &RequestId) -> Result<Claim> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.clone()) {
            return Err(Error::Conflict(format!(
                "a request with id `{}` is already in progress",
                id
            )));
        }
        debug!(request_id = %id, active = ids.len(), "Claimed request id");
        Ok(Claim {
            ids: self.ids.clone(),
            id: id.clone(),
        })
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its id when dropped.
#[derive(Debug)]
pub struct Claim {
    ids: Arc<Mutex<HashSet<RequestId>>>,
    id: RequestId,
}

impl Claim {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        debug!(request_id = %self.id, "Released request id");
    }
}
