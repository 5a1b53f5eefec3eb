//! The process-wide allocator hook (`spec.md` §4.9).
//!
//! A pinned struct/array can grow a new element or follow a `Ptr` that needs
//! backing storage created on demand; the overlay has no opinion on where
//! that memory comes from; the embedder installs one allocator function
//! once (typically at startup) and every later `alloc_in` call goes through
//! it.

use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::vm::{Addr, Vm};

/// `fn(vm, size) -> Result<address of a fresh, size-byte region, Error>`.
pub type AllocFn = dyn Fn(&dyn Vm, usize) -> Result<Addr, Error> + Send + Sync;

static ALLOCATOR: OnceCell<Box<AllocFn>> = OnceCell::new();

/// Install the process-wide allocator. Like `SelfCell::bind`, later calls
/// after the first are silently ignored — the spec models this as a
/// once-per-process setup step, not a swappable strategy.
pub fn set_allocator<F>(f: F)
where
    F: Fn(&dyn Vm, usize) -> Result<Addr, Error> + Send + Sync + 'static,
{
    let _ = ALLOCATOR.set(Box::new(f));
}

pub fn has_allocator() -> bool {
    ALLOCATOR.get().is_some()
}

/// Allocate `size` bytes in `vm` using the installed allocator.
pub fn alloc_in(vm: &dyn Vm, size: usize) -> Result<Addr, Error> {
    match ALLOCATOR.get() {
        Some(f) => f(vm, size),
        None => Err(Error::NoAllocator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct NullVm;
    impl Vm for NullVm {
        fn read(&self, _addr: Addr, len: usize) -> Result<Vec<u8>, Error> {
            Ok(vec![0; len])
        }
        fn write(&self, _addr: Addr, _data: &[u8]) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn missing_allocator_is_an_error() {
        // Whether this runs before or after other tests install an allocator
        // in the same process depends on test ordering, so only assert the
        // shape of the behavior when none is installed.
        if !has_allocator() {
            let vm = NullVm;
            assert!(matches!(alloc_in(&vm, 8), Err(Error::NoAllocator)));
        }
    }

    #[test]
    fn installed_allocator_is_used() {
        static NEXT: AtomicU64 = AtomicU64::new(0x1000);
        set_allocator(|_vm, size| Ok(NEXT.fetch_add(size as u64, Ordering::SeqCst)));
        let vm = NullVm;
        let a = alloc_in(&vm, 16).unwrap();
        let b = alloc_in(&vm, 16).unwrap();
        assert!(b > a);
    }
}
