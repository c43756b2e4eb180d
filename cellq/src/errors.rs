use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("shared memory error: {0}")]
    SharedMemory(#[from] shared_memory::ShmemError),

    #[error("could not create semaphore {name}: {source}")]
    SemaphoreCreate { name: String, source: io::Error },

    #[error("could not open semaphore {name}: {source}")]
    SemaphoreOpen { name: String, source: io::Error },

    #[error("semaphore {op} on {name} failed: {source}")]
    Semaphore {
        op: &'static str,
        name: String,
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid queue name {0:?}")]
    InvalidName(String),

    #[error("capacity {0} is out of range, a ring holds 2 to i32::MAX cells")]
    InvalidCapacity(usize),

    #[error("segment {name} is not a cellq region")]
    ForeignSegment { name: String },

    #[error("segment {name} is {actual} bytes, expected at least {expected}")]
    RegionTooSmall {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("corrupt record header {0}")]
    CorruptRecord(i32),
}

impl QueueError {
    pub(crate) fn semaphore(op: &'static str, name: &str) -> QueueError {
        QueueError::Semaphore {
            op,
            name: name.to_string(),
            source: io::Error::last_os_error(),
        }
    }
}
