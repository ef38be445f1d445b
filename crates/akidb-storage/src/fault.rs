//! Deterministic failure injection for the in-memory backends.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use akidb_core::{CoreError, CoreResult, RepositoryId};

/// Backing-store operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Query,
    Count,
}

#[derive(Debug, Clone)]
struct Fault {
    /// `None` fails forever.
    remaining: Option<u32>,
    error: CoreError,
}

/// Shared table of pending faults keyed by repository and operation.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<Mutex<HashMap<(RepositoryId, StoreOp), Fault>>>,
}

impl FaultPlan {
    /// Fails the next `times` calls of `op` against `repository_id`.
    pub fn fail_times(&self, repository_id: &RepositoryId, op: StoreOp, times: u32, error: CoreError) {
        self.faults.lock().insert(
            (repository_id.clone(), op),
            Fault {
                remaining: Some(times),
                error,
            },
        );
    }

    /// Fails every call of `op` against `repository_id` until cleared.
    pub fn fail_always(&self, repository_id: &RepositoryId, op: StoreOp, error: CoreError) {
        self.faults.lock().insert(
            (repository_id.clone(), op),
            Fault {
                remaining: None,
                error,
            },
        );
    }

    pub fn clear(&self) {
        self.faults.lock().clear();
    }

    /// Consumes one pending failure, if any.
    pub(crate) fn check(&self, repository_id: &RepositoryId, op: StoreOp) -> CoreResult<()> {
        let mut faults = self.faults.lock();
        let key = (repository_id.clone(), op);
        let Some(fault) = faults.get_mut(&key) else {
            return Ok(());
        };

        let error = fault.error.clone();
        match fault.remaining.as_mut() {
            None => Err(error),
            Some(0) => {
                faults.remove(&key);
                Ok(())
            }
            Some(n) => {
                *n -= 1;
                if *n == 0 {
                    faults.remove(&key);
                }
                Err(error)
            }
        }
    }
}
