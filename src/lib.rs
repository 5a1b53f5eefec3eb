//! A typed memory overlay: C-style struct/union/bitfield/array/string
//! descriptors laid over a sandboxed VM's `read`/`write` primitives.
//!
//! The crate is two layers. [`types::Type`] is a descriptor algebra — a
//! `Struct` knows its fields' byte offsets, a `Ptr` knows what it points at,
//! a `BitField` knows how its bits pack into a backing word — built without
//! ever touching memory. [`pinned::Pinned`] binds a descriptor to a
//! concrete `(vm, addr)` and is where reads and writes actually happen.
//!
//! ```
//! use vmtype::{num, ptr, struct_, self_marker, pin, testutil::VecVm};
//!
//! let node = struct_(
//!     "Node",
//!     vec![("value", num("<I").unwrap()), ("next", ptr("<Q", self_marker()).unwrap())],
//! )
//! .unwrap();
//!
//! let vm = VecVm::new(64);
//! let head = pin(&node, &vm, 0);
//! head.field("value").unwrap().set(vmtype::Value::U32(7)).unwrap();
//! assert_eq!(head.field("value").unwrap().get().unwrap(), vmtype::Value::U32(7));
//! ```

pub mod alloc;
pub mod cache;
pub mod error;
pub mod format;
pub mod layout;
pub mod pinned;
pub mod selfref;
pub mod types;
pub mod vm;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::Error;
pub use format::Value;
pub use pinned::{pin, pin_alloc, Pinned};
pub use types::{array, bitfield, bits, num, ptr, raw, self_marker, str_, struct_, union_, StrEncoding, Type};
pub use vm::{Addr, Vm};

pub use alloc::set_allocator;
