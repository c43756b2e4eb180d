use std::mem;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use shared_memory::{Shmem, ShmemConf, ShmemError};
use tracing::{debug, warn};

use crate::errors::{QueueError, Result};

const MAGIC: u64 = 0x6365_6c6c_7175_6575; // "cellqueu"

#[repr(C)]
pub struct RegionHeader {
    magic: u64,
    capacity: usize,
    // Written by producers only, under the writer mutex.
    write_cursor: AtomicUsize,
    // Written by the consumer only.
    read_cursor: AtomicUsize,
    stop: AtomicBool,
}

const HEADER_SIZE: usize = mem::size_of::<RegionHeader>();

/// A pair's two cells must fit in the ring at once.
pub const MIN_CAPACITY: usize = 2;
/// `free` starts at the capacity and cannot exceed `SEM_VALUE_MAX` (`INT_MAX`
/// on Linux).
pub const MAX_CAPACITY: usize = i32::MAX as usize;

/// Bytes needed for a ring of `capacity` cells, `None` on overflow.
#[inline]
fn region_size(capacity: usize) -> Option<usize> {
    capacity
        .checked_mul(mem::size_of::<AtomicI32>())?
        .checked_add(HEADER_SIZE)
}

/// Checks the capacity bounds and returns the segment size.
fn checked_region_size(capacity: usize) -> Result<usize> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(QueueError::InvalidCapacity(capacity));
    }
    region_size(capacity).ok_or(QueueError::InvalidCapacity(capacity))
}

/// The mapped ring of cells plus its cursors and stop flag.
pub struct SharedRegion {
    shmem: Shmem,
    capacity: usize,
}

impl SharedRegion {
    /// Creates and zero-initializes the segment `os_id`. The returned region
    /// owns the segment and unlinks it on drop.
    pub fn create(os_id: &str, capacity: usize) -> Result<SharedRegion> {
        let size = checked_region_size(capacity)?;
        let shmem = match ShmemConf::new().size(size).os_id(os_id).create() {
            Ok(v) => v,
            Err(ShmemError::MappingIdExists) => {
                warn!(
                    os_id,
                    "unlinking existing shared memory segment; a queue still running under \
                     this name is cut off from new participants"
                );
                let mut stale = ShmemConf::new().os_id(os_id).open()?;
                stale.set_owner(true);
                drop(stale);
                ShmemConf::new().size(size).os_id(os_id).create()?
            }
            Err(e) => return Err(e.into()),
        };
        unsafe {
            ptr::write(
                shmem.as_ptr() as *mut RegionHeader,
                RegionHeader {
                    magic: MAGIC,
                    capacity,
                    write_cursor: AtomicUsize::new(0),
                    read_cursor: AtomicUsize::new(0),
                    stop: AtomicBool::new(false),
                },
            );
        }
        let region = SharedRegion { shmem, capacity };
        for cell in region.cells() {
            cell.store(0, Ordering::Relaxed);
        }
        debug!(os_id, capacity, size, "shared region created");
        Ok(region)
    }

    /// Maps an existing segment. The capacity is taken from its header.
    pub fn open(os_id: &str) -> Result<SharedRegion> {
        let shmem = ShmemConf::new().os_id(os_id).open()?;
        if shmem.len() < HEADER_SIZE {
            return Err(QueueError::RegionTooSmall {
                name: os_id.to_string(),
                expected: HEADER_SIZE,
                actual: shmem.len(),
            });
        }
        let header = unsafe { &*(shmem.as_ptr() as *const RegionHeader) };
        if header.magic != MAGIC {
            return Err(QueueError::ForeignSegment {
                name: os_id.to_string(),
            });
        }
        let capacity = header.capacity;
        let expected = checked_region_size(capacity)?;
        if shmem.len() < expected {
            return Err(QueueError::RegionTooSmall {
                name: os_id.to_string(),
                expected,
                actual: shmem.len(),
            });
        }
        debug!(os_id, capacity, "shared region attached");
        Ok(SharedRegion { shmem, capacity })
    }

    #[inline]
    fn header(&self) -> &RegionHeader {
        unsafe { &*(self.shmem.as_ptr() as *const RegionHeader) }
    }

    #[inline]
    fn cells(&self) -> &[AtomicI32] {
        unsafe {
            let base = self.shmem.as_ptr().add(HEADER_SIZE) as *const AtomicI32;
            slice::from_raw_parts(base, self.capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_owner(&self) -> bool {
        self.shmem.is_owner()
    }

    /// Reads the cell that `cursor` maps to.
    #[inline]
    pub fn load(&self, cursor: usize) -> i32 {
        self.cells()[cursor % self.capacity].load(Ordering::Relaxed)
    }

    /// Writes the cell that `cursor` maps to.
    #[inline]
    pub fn store(&self, cursor: usize, value: i32) {
        self.cells()[cursor % self.capacity].store(value, Ordering::Relaxed)
    }

    #[inline]
    pub fn write_cursor(&self) -> usize {
        self.header().write_cursor.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_write_cursor(&self, cursor: usize) {
        self.header().write_cursor.store(cursor, Ordering::Relaxed)
    }

    #[inline]
    pub fn read_cursor(&self) -> usize {
        self.header().read_cursor.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_read_cursor(&self, cursor: usize) {
        self.header().read_cursor.store(cursor, Ordering::Relaxed)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.header().stop.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.header().stop.store(true, Ordering::SeqCst)
    }
}
