//! The narrow VM contract this overlay is built on (`spec.md` §6).
//!
//! The VM, the heap allocator backing it and the component that populates it
//! (a CPU emulator, a debugger, a fuzzer harness...) are all external
//! collaborators; this module only states the two primitives the overlay
//! consumes.

use crate::error::Error;

/// An address in the VM's flat byte-addressable space. The embedding fixes
/// the real width (32 or 64 bits); the overlay always carries addresses as
/// `u64` and lets a `Ptr`'s own format narrow them on the wire.
pub type Addr = u64;

/// A sandboxed virtual memory manager.
///
/// Both methods take `&self`: real embeddings (a sandbox VM, a debuggee's
/// memory, a `Vec<u8>` backed by a lock) already provide their own interior
/// mutability, and the overlay is specified to hold no locks of its own
/// (`spec.md` §5). This is what lets two pinned views alias the same bytes:
/// a write through one is a write through `&self`, immediately visible to a
/// read through the other.
pub trait Vm {
    /// Read `len` bytes starting at `addr`.
    fn read(&self, addr: Addr, len: usize) -> Result<Vec<u8>, Error>;

    /// Write `data` starting at `addr`.
    fn write(&self, addr: Addr, data: &[u8]) -> Result<(), Error>;
}
