//! Process-wide memoization of `Type -> pinned-view shape` (`spec.md` §4.8).
//!
//! Constructing a `Type` (walking a struct's fields, computing offsets,
//! promoting union members) is pure but not free, and callers are expected
//! to call `pin()` on the same logical descriptor repeatedly — once per
//! access, in the style of the original source, rather than caching the
//! descriptor themselves. This module exists so that doesn't mean redoing
//! the layout work on every call.
//!
//! Keyed by `Type` itself (its `PartialEq`/`Hash` impls already collapse
//! equivalent descriptors, including the struct-by-name exception), set
//! once per distinct descriptor and read on every subsequent `pin()`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::types::Type;

/// The cached "shape" of a descriptor: nothing the VM can invalidate, just
/// the parts of a `Type` that are expensive to recompute (its size, for
/// now) and that pinning needs on every call.
#[derive(Clone)]
pub struct Shape {
    pub size: Option<usize>,
}

static CACHE: Lazy<RwLock<HashMap<Type, Shape>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Look up (or compute and memoize) the shape for `ty`.
pub fn shape_for(ty: &Type) -> Shape {
    if let Some(shape) = CACHE.read().get(ty) {
        return shape.clone();
    }
    let shape = Shape { size: ty.size().ok() };
    CACHE.write().entry(ty.clone()).or_insert(shape).clone()
}

/// Number of distinct descriptors currently memoized. Exposed for tests;
/// not part of the public surface consumers are expected to rely on.
#[cfg(test)]
pub(crate) fn len() -> usize {
    CACHE.read().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::num;

    #[test]
    fn identical_descriptors_share_one_cache_entry() {
        let before = len();
        let a = num("<I").unwrap();
        let b = num("<I").unwrap();
        let shape_a = shape_for(&a);
        let shape_b = shape_for(&b);
        assert_eq!(shape_a.size, Some(4));
        assert_eq!(shape_b.size, Some(4));
        assert_eq!(len(), before + 1);
    }
}
