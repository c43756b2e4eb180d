use std::ffi::CString;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{trace, warn};

use crate::errors::{QueueError, Result};

/// How often a cancellable wait re-checks its flag.
pub const CANCEL_POLL: Duration = Duration::from_millis(100);

/// A POSIX named semaphore (`sem_open`).
///
/// A semaphore created by this handle unlinks its name when dropped, so a
/// half-built triple is rolled back by simply dropping what was built.
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: String,
    unlink_on_drop: bool,
}

// POSIX semaphores are safe to use from any thread.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| QueueError::InvalidName(name.to_string()))
}

impl NamedSemaphore {
    /// Creates `name` with `initial` credits. An existing semaphore with the
    /// same name is unlinked first.
    pub fn create(name: &str, initial: u32) -> Result<NamedSemaphore> {
        let cname = c_name(name)?;
        unsafe {
            if libc::sem_unlink(cname.as_ptr()) == 0 {
                warn!(
                    name,
                    "unlinked existing semaphore; a queue still running under this name keeps \
                     the old one and no longer reaches new participants"
                );
            }
            let sem = libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            );
            if sem == libc::SEM_FAILED {
                return Err(QueueError::SemaphoreCreate {
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            trace!(name, initial, "semaphore created");
            Ok(NamedSemaphore {
                sem,
                name: name.to_string(),
                unlink_on_drop: true,
            })
        }
    }

    /// Opens an existing semaphore; never creates one.
    pub fn open(name: &str) -> Result<NamedSemaphore> {
        let cname = c_name(name)?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(QueueError::SemaphoreOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(NamedSemaphore {
            sem,
            name: name.to_string(),
            unlink_on_drop: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes one credit, blocking until one is available.
    pub fn wait(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(QueueError::Semaphore {
                    op: "wait",
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
    }

    /// Takes one credit unless `cancel` becomes true first. Returns `false`
    /// when cancelled without taking a credit.
    pub fn wait_cancellable(&self, cancel: &AtomicBool, poll: Duration) -> Result<bool> {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(false);
            }
            if self.timed_wait(poll)? {
                return Ok(true);
            }
        }
    }

    /// Takes one credit. Without a flag this is [`wait`](Self::wait); with one
    /// it is [`wait_cancellable`](Self::wait_cancellable) polling every
    /// [`CANCEL_POLL`].
    pub fn acquire(&self, cancel: Option<&AtomicBool>) -> Result<bool> {
        match cancel {
            Some(cancel) => self.wait_cancellable(cancel, CANCEL_POLL),
            None => self.wait().map(|()| true),
        }
    }

    #[cfg(target_os = "linux")]
    fn timed_wait(&self, timeout: Duration) -> Result<bool> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) } != 0 {
            return Err(QueueError::semaphore("clock_gettime", &self.name));
        }
        let nanos = deadline.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
        deadline.tv_sec += timeout.as_secs() as libc::time_t + (nanos / 1_000_000_000) as libc::time_t;
        deadline.tv_nsec = (nanos % 1_000_000_000) as _;

        if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ETIMEDOUT) | Some(libc::EINTR) => Ok(false),
            _ => Err(QueueError::Semaphore {
                op: "timedwait",
                name: self.name.clone(),
                source: err,
            }),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn timed_wait(&self, timeout: Duration) -> Result<bool> {
        let step = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => {}
                _ => {
                    return Err(QueueError::Semaphore {
                        op: "trywait",
                        name: self.name.clone(),
                        source: err,
                    })
                }
            }
            std::thread::sleep(step);
            waited += step;
        }
        Ok(false)
    }

    /// Returns one credit.
    pub fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(QueueError::semaphore("post", &self.name));
        }
        Ok(())
    }

    /// Current number of credits.
    pub fn value(&self) -> Result<i32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } != 0 {
            return Err(QueueError::semaphore("getvalue", &self.name));
        }
        Ok(value)
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            if libc::sem_close(self.sem) != 0 {
                warn!(name = %self.name, error = %io::Error::last_os_error(), "sem_close failed");
            }
            if self.unlink_on_drop {
                if let Ok(cname) = CString::new(self.name.as_str()) {
                    if libc::sem_unlink(cname.as_ptr()) != 0 {
                        warn!(name = %self.name, error = %io::Error::last_os_error(), "sem_unlink failed");
                    }
                }
            }
        }
    }
}

/// Holds the writer mutex; the credit goes back when the guard drops.
pub struct SemaphoreGuard<'a> {
    sem: &'a NamedSemaphore,
}

impl<'a> SemaphoreGuard<'a> {
    /// `None` when `cancel` was set before the credit could be taken.
    pub fn acquire(
        sem: &'a NamedSemaphore,
        cancel: Option<&AtomicBool>,
    ) -> Result<Option<SemaphoreGuard<'a>>> {
        if !sem.acquire(cancel)? {
            return Ok(None);
        }
        Ok(Some(SemaphoreGuard { sem }))
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.post() {
            warn!(error = %e, "could not release writer mutex");
        }
    }
}
