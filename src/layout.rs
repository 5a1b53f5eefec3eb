//! Size and offset computation shared by `Struct`, `Union` and `BitField`
//! construction. Kept separate from [`crate::types`] the way the teacher
//! keeps SPIR-V layout math (`std140_struct_layout` et al.) out of the type
//! descriptor enum itself — here the rule is simpler (packed, no padding)
//! but the separation of concerns is the same.

use crate::error::Error;
use crate::types::Type;

/// Sequential, zero-padding field offsets: `offset(f) = sum(size(g))` for
/// every field `g` preceding `f`. Every field of a `Struct` must be
/// statically sized.
pub fn struct_offsets(fields: &[(String, Type)]) -> Result<(Vec<usize>, usize), Error> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset = 0usize;
    for (name, ty) in fields {
        offsets.push(offset);
        let size = ty
            .size()
            .map_err(|_| Error::Unsized(format!("field '{name}' has unsized type {ty:?}")))?;
        offset += size;
    }
    Ok((offsets, offset))
}

/// All members share offset 0; the union's size is the largest member.
pub fn union_offsets(fields: &[(String, Type)]) -> Result<(Vec<usize>, usize), Error> {
    let mut max = 0usize;
    for (name, ty) in fields {
        let size = ty
            .size()
            .map_err(|_| Error::Unsized(format!("union member '{name}' has unsized type {ty:?}")))?;
        max = max.max(size);
    }
    let offsets = vec![0usize; fields.len()];
    Ok((offsets, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::num;

    #[test]
    fn struct_offsets_are_sequential() {
        let fields = vec![
            ("a".to_string(), num("B").unwrap()),
            ("b".to_string(), num("<I").unwrap()),
            ("c".to_string(), num("B").unwrap()),
        ];
        let (offsets, size) = struct_offsets(&fields).unwrap();
        assert_eq!(offsets, vec![0, 1, 5]);
        assert_eq!(size, 6);
    }

    #[test]
    fn union_offsets_are_all_zero() {
        let fields = vec![
            ("a".to_string(), num("B").unwrap()),
            ("b".to_string(), num("<H").unwrap()),
        ];
        let (offsets, size) = union_offsets(&fields).unwrap();
        assert_eq!(offsets, vec![0, 0]);
        assert_eq!(size, 2);
    }
}
