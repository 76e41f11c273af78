//! Lock-protected switch for multi-core kernels
//!
//! [`Vfs`] itself is single-owner. Kernels that call into it from more than
//! one core share it through [`SharedVfs`], which serializes every operation
//! behind a spin lock.

use spin::Mutex;

use crate::vfs::Vfs;

/// Spin-locked VFS switch
pub struct SharedVfs {
    inner: Mutex<Vfs>,
}

impl SharedVfs {
    pub fn new(vfs: Vfs) -> Self {
        Self {
            inner: Mutex::new(vfs),
        }
    }

    /// Run `f` with exclusive access to the switch
    pub fn with<R>(&self, f: impl FnOnce(&mut Vfs) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Take the switch back out of the lock
    pub fn into_inner(self) -> Vfs {
        self.inner.into_inner()
    }
}
