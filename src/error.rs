//! Error taxonomy (`spec.md` §7). All errors are surfaced to the caller; the
//! library recovers from nothing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A numeric format yielded the wrong arity, or a struct-pack failed.
    #[error("format error: {0}")]
    Format(String),

    /// Size/length mismatch in a bulk assignment or pointer write.
    #[error("shape error: {0}")]
    Shape(String),

    /// A name is not present in a struct/union's field directory.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// An array index is out of bounds.
    #[error("index {index} out of bounds (len {len})")]
    Index { index: i64, len: usize },

    /// A bitfield's bit widths sum to more than its backing `Num` can hold.
    #[error("bitfield of {bits} bits overflows {backing_bits}-bit backing num")]
    Overflow { bits: usize, backing_bits: usize },

    /// `size()` was requested on an unsized descriptor, or it was
    /// auto-allocated.
    #[error("type is unsized: {0}")]
    Unsized(String),

    /// No address was given and no allocator has been installed.
    #[error("no allocator installed; provide an address or call set_allocator")]
    NoAllocator,

    /// A `SelfMarker` was dereferenced outside of the struct that binds it.
    #[error("unbound self-reference: type was never embedded in an enclosing struct")]
    UnboundSelf,

    /// Propagated from the VM's `read`/`write` primitives.
    #[error("vm fault: {0}")]
    VmFault(String),
}
