//! Running-job registry.
//!
//! Job count and concurrency slots are one gate: a job is registered only
//! together with a semaphore permit, and both are given back by the same
//! [`JobSlot`] drop. The registry therefore never holds more than `limit`
//! entries and an identifier can never run twice at once.

use carcopy_ids::ContentId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::scanner::CarFileInfo;

/// Outcome of [`JobTracker::try_admit`].
#[derive(Debug)]
pub enum Admission {
    Admitted(JobSlot),
    /// A job with the same content ID is still running.
    AlreadyRunning,
    /// Every slot is taken.
    Saturated,
}

struct Inner {
    jobs: RwLock<HashMap<ContentId, CarFileInfo>>,
    slots: Arc<Semaphore>,
}

impl Inner {
    // Entries are single inserts/removes, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ContentId, CarFileInfo>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ContentId, CarFileInfo>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
    limit: usize,
}

impl JobTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                slots: Arc::new(Semaphore::new(limit)),
            }),
            limit,
        }
    }

    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether every slot is taken by a registered job.
    pub fn is_saturated(&self) -> bool {
        self.count() >= self.limit
    }

    /// Currently registered jobs, in no particular order.
    pub fn snapshot(&self) -> Vec<CarFileInfo> {
        self.inner.read().values().cloned().collect()
    }

    /// Drop files whose content ID is already running, keeping scan order.
    pub fn filter_untracked(&self, files: Vec<CarFileInfo>) -> Vec<CarFileInfo> {
        let jobs = self.inner.read();
        files
            .into_iter()
            .filter(|f| !jobs.contains_key(&f.content_id))
            .collect()
    }

    /// Take a slot and register `file` in one step.
    pub fn try_admit(&self, file: CarFileInfo) -> Admission {
        let mut jobs = self.inner.write();
        if jobs.contains_key(&file.content_id) {
            return Admission::AlreadyRunning;
        }
        let permit = match Arc::clone(&self.inner.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Admission::Saturated,
        };
        jobs.insert(file.content_id, file.clone());
        drop(jobs);

        debug!(content_id = %file.content_id, "Registered job");
        Admission::Admitted(JobSlot {
            inner: Arc::clone(&self.inner),
            file,
            permit: Some(permit),
        })
    }
}

/// Registration plus concurrency slot for one running job.
///
/// Dropping it deregisters the job and frees the slot, on every exit path of
/// the owning task (return, error, panic, abort).
#[derive(Debug)]
pub struct JobSlot {
    inner: Arc<Inner>,
    file: CarFileInfo,
    permit: Option<OwnedSemaphorePermit>,
}

impl JobSlot {
    pub fn car_file(&self) -> &CarFileInfo {
        &self.file
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.inner.write().remove(&self.file.content_id);
        self.permit.take();
        debug!(content_id = %self.file.content_id, "Deregistered job");
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("jobs", &self.read().len())
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}
