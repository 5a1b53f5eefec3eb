//! An in-process [`crate::vm::Vm`] backed by a locked byte buffer, used by
//! this crate's own test suite and available to downstream crates under the
//! `testutil` feature for exercising the overlay without a real sandbox.

use parking_lot::Mutex;

use crate::error::Error;
use crate::vm::{Addr, Vm};

/// A flat `Vec<u8>` addressed from zero, wrapped in a mutex so it can
/// satisfy [`Vm`]'s `&self`-for-both-methods contract.
pub struct VecVm {
    bytes: Mutex<Vec<u8>>,
}

impl VecVm {
    pub fn new(size: usize) -> VecVm {
        VecVm { bytes: Mutex::new(vec![0u8; size]) }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> VecVm {
        VecVm { bytes: Mutex::new(bytes) }
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Grow the buffer to at least `size` bytes, zero-filling the new tail.
    /// Used by the test allocator to hand out addresses past the initial
    /// size.
    pub fn grow_to(&self, size: usize) {
        let mut guard = self.bytes.lock();
        if guard.len() < size {
            guard.resize(size, 0);
        }
    }
}

impl Vm for VecVm {
    fn read(&self, addr: Addr, len: usize) -> Result<Vec<u8>, Error> {
        let guard = self.bytes.lock();
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| Error::VmFault(format!("read at {addr:#x} of {len} bytes overflows")))?;
        guard
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or_else(|| Error::VmFault(format!("read out of bounds: {addr:#x}..{end:#x}, buffer is {} bytes", guard.len())))
    }

    fn write(&self, addr: Addr, data: &[u8]) -> Result<(), Error> {
        let mut guard = self.bytes.lock();
        let start = addr as usize;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| Error::VmFault(format!("write at {addr:#x} of {} bytes overflows", data.len())))?;
        if end > guard.len() {
            return Err(Error::VmFault(format!(
                "write out of bounds: {addr:#x}..{end:#x}, buffer is {} bytes",
                guard.len()
            )));
        }
        guard[start..end].copy_from_slice(data);
        Ok(())
    }
}

/// A bump allocator over a [`VecVm`], installed with
/// [`crate::alloc::set_allocator`] in tests that exercise allocation.
pub struct BumpAllocator {
    next: Mutex<Addr>,
}

impl BumpAllocator {
    pub fn new(start: Addr) -> BumpAllocator {
        BumpAllocator { next: Mutex::new(start) }
    }

    /// Hand out the next `size` bytes. Callers are expected to back the VM
    /// with enough room up front (via [`VecVm::grow_to`]) since this
    /// allocator, like the process-wide hook it backs, only knows an
    /// address, not how to resize an arbitrary `Vm`.
    pub fn alloc(&self, _vm: &dyn Vm, size: usize) -> Result<Addr, Error> {
        let mut next = self.next.lock();
        let addr = *next;
        *next += size as u64;
        Ok(addr)
    }
}
