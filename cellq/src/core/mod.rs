use std::fmt;

use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{QueueError, Result};

mod region;
mod semaphore;

pub use region::{SharedRegion, MAX_CAPACITY, MIN_CAPACITY};
pub use semaphore::{NamedSemaphore, SemaphoreGuard, CANCEL_POLL};

/// Cells in the ring when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 300;
pub const DEFAULT_QUEUE_NAME: &str = "cellq";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix for the segment and semaphore names.
    pub name: String,
    /// Ring size in cells. Only the creating side uses it; attaching sides
    /// read the capacity from the segment.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            name: DEFAULT_QUEUE_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, capacity: usize) -> QueueConfig {
        QueueConfig {
            name: name.into(),
            capacity,
        }
    }

    pub fn names(&self) -> Result<QueueNames> {
        QueueNames::new(&self.name)
    }
}

/// The well-known OS names every participant derives from the queue name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub shmem: String,
    pub free: String,
    pub used: String,
    pub mutex: String,
}

impl QueueNames {
    pub fn new(name: &str) -> Result<QueueNames> {
        let valid = !name.is_empty()
            && name.len() <= 200
            && name.chars().all(|c| c.is_ascii() && c != '/' && c != '\0' && !c.is_ascii_control());
        if !valid {
            return Err(QueueError::InvalidName(name.to_string()));
        }
        Ok(QueueNames {
            shmem: format!("/{}.shm", name),
            free: format!("/{}.free", name),
            used: format!("/{}.used", name),
            mutex: format!("/{}.mutex", name),
        })
    }
}

/// Flow control and writer exclusion: `free` counts empty cells, `used`
/// counts filled cells, `mutex` serializes producers.
pub struct SyncTriple {
    pub free: NamedSemaphore,
    pub used: NamedSemaphore,
    pub mutex: NamedSemaphore,
}

impl SyncTriple {
    fn create(names: &QueueNames, capacity: usize) -> Result<SyncTriple> {
        let initial = u32::try_from(capacity).map_err(|_| QueueError::InvalidCapacity(capacity))?;
        // Whatever was created before a failure unlinks itself on drop.
        let free = NamedSemaphore::create(&names.free, initial)?;
        let used = NamedSemaphore::create(&names.used, 0)?;
        let mutex = NamedSemaphore::create(&names.mutex, 1)?;
        Ok(SyncTriple { free, used, mutex })
    }

    fn open(names: &QueueNames) -> Result<SyncTriple> {
        Ok(SyncTriple {
            free: NamedSemaphore::open(&names.free)?,
            used: NamedSemaphore::open(&names.used)?,
            mutex: NamedSemaphore::open(&names.mutex)?,
        })
    }
}

/// Snapshot of the three semaphore values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credits {
    pub free: i32,
    pub used: i32,
    pub mutex: i32,
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "free={} used={} mutex={}", self.free, self.used, self.mutex)
    }
}

/// One process's handle on the shared region and its semaphore triple.
///
/// Dropping the handle detaches. When the handle is the owner, dropping it
/// also unlinks the segment and the three semaphores.
pub struct Queue {
    region: SharedRegion,
    sems: SyncTriple,
    names: QueueNames,
}

impl Queue {
    /// Creates the region and the triple `{capacity, 0, 1}`.
    pub fn create(cfg: &QueueConfig) -> Result<Queue> {
        let names = cfg.names()?;
        let region = SharedRegion::create(&names.shmem, cfg.capacity)?;
        let sems = SyncTriple::create(&names, cfg.capacity)?;
        info!(name = %cfg.name, capacity = cfg.capacity, "queue created");
        Ok(Queue { region, sems, names })
    }

    /// Opens a queue created by another participant.
    pub fn attach(cfg: &QueueConfig) -> Result<Queue> {
        let names = cfg.names()?;
        let region = SharedRegion::open(&names.shmem)?;
        let sems = SyncTriple::open(&names)?;
        info!(name = %cfg.name, capacity = region.capacity(), "queue attached");
        Ok(Queue { region, sems, names })
    }

    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn sems(&self) -> &SyncTriple {
        &self.sems
    }

    pub fn is_stopped(&self) -> bool {
        self.region.is_stopped()
    }

    /// Sets the stop flag. Only the owner calls this.
    pub fn request_stop(&self) {
        self.region.request_stop()
    }

    pub fn credits(&self) -> Result<Credits> {
        Ok(Credits {
            free: self.sems.free.value()?,
            used: self.sems.used.value()?,
            mutex: self.sems.mutex.value()?,
        })
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if self.region.is_owner() {
            info!(shmem = %self.names.shmem, "queue destroyed");
        }
    }
}
