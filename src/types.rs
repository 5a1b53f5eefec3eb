//! The type descriptor algebra (`spec.md` §3–4).
//!
//! `Type` is a tagged sum (the design notes call for avoiding a virtual
//! dispatch tree); every case that needs to share data with other
//! descriptors — a `Ptr`'s target, an `Array`'s element, a `Struct`'s field
//! list — wraps its payload in `Arc` so descriptors are cheap to clone and
//! safe to memoize in the process-wide cache (`crate::cache`).
//!
//! This module only deals in bytes and [`Value`]s; it never touches a
//! [`crate::vm::Vm`]. VM-touching operations (reading/writing through an
//! address, scanning a NUL-terminated string, bitfield read-modify-write)
//! live in [`crate::pinned`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::format::{Format, Value};
use crate::selfref::{self, SelfCell};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StrEncoding {
    Ansi,
    Utf16Le,
}

#[derive(Clone)]
pub struct RawInner {
    pub format: Format,
}

#[derive(Clone)]
pub struct NumInner {
    pub format: Format,
}

pub struct PtrInner {
    pub format: Format,
    cell: Arc<SelfCell>,
}

impl PtrInner {
    pub fn bind_self(&self, self_type: Type) {
        self.cell.bind(self_type);
    }

    pub fn dst_type(&self) -> Result<Type, Error> {
        self.cell.resolve()
    }

    pub fn is_bound(&self) -> bool {
        self.cell.is_bound()
    }
}

pub struct ArrayInner {
    pub elem: Type,
    pub len: Option<usize>,
}

pub struct BitsInner {
    pub format: Format,
    pub bits: u32,
    pub bit_offset: u32,
}

/// A named field's offset and type, as recorded in a struct/union/bitfield's
/// field directory (including fields promoted out of an anonymous nested
/// `Union`/`BitField`, `spec.md` §4.3).
#[derive(Clone)]
pub struct FieldEntry {
    pub offset: usize,
    pub ty: Type,
}

pub struct StructInner {
    pub name: String,
    pub fields: Vec<(String, Type)>,
    pub offsets: Vec<usize>,
    pub size: usize,
    pub field_map: HashMap<String, FieldEntry>,
}

pub struct BitFieldInner {
    pub backing: Format,
    pub fields: Vec<(String, Type)>,
    pub size: usize,
    pub field_map: HashMap<String, FieldEntry>,
}

/// A type descriptor: describes how a region of VM memory is interpreted,
/// independent of any particular `(vm, addr)`.
#[derive(Clone)]
pub enum Type {
    Raw(Arc<RawInner>),
    Num(Arc<NumInner>),
    Ptr(Arc<PtrInner>),
    Struct(Arc<StructInner>),
    Union(Arc<StructInner>),
    Array(Arc<ArrayInner>),
    Bits(Arc<BitsInner>),
    BitField(Arc<BitFieldInner>),
    Str(StrEncoding),
    Void,
    SelfMarker,
}

// ---- constructors ----------------------------------------------------

pub fn raw(fmt: &str) -> Result<Type, Error> {
    Ok(Type::Raw(Arc::new(RawInner { format: Format::parse(fmt)? })))
}

pub fn num(fmt: &str) -> Result<Type, Error> {
    let format = Format::parse(fmt)?;
    if format.scalars.len() != 1 {
        return Err(Error::Format(format!(
            "Num format '{fmt}' must unpack to exactly one value, got {}",
            format.scalars.len()
        )));
    }
    Ok(Type::Num(Arc::new(NumInner { format })))
}

/// `dst_type` may be a concrete descriptor or the [`self_marker`] sentinel,
/// in which case the pointer is bound lazily the first time it is embedded
/// as a field of a `Struct`/`Array` (`spec.md` §4.2).
pub fn ptr(fmt: &str, dst_type: Type) -> Result<Type, Error> {
    let format = Format::parse(fmt)?;
    if format.scalars.len() != 1 {
        return Err(Error::Format(format!(
            "Ptr format '{fmt}' must unpack to exactly one value, got {}",
            format.scalars.len()
        )));
    }
    let cell = SelfCell::new();
    if !matches!(&dst_type, Type::SelfMarker) {
        cell.bind(dst_type);
    }
    Ok(Type::Ptr(Arc::new(PtrInner { format, cell })))
}

pub fn struct_(name: &str, fields: Vec<(&str, Type)>) -> Result<Type, Error> {
    let fields: Vec<(String, Type)> = fields.into_iter().map(|(n, t)| (n.to_string(), t)).collect();
    let (offsets, size) = crate::layout::struct_offsets(&fields)?;
    let mut field_map = HashMap::new();
    for ((fname, fty), off) in fields.iter().zip(offsets.iter()) {
        field_map.insert(fname.clone(), FieldEntry { offset: *off, ty: fty.clone() });
        promote_members(&mut field_map, fty, *off);
    }
    let inner = Arc::new(StructInner { name: name.to_string(), fields, offsets, size, field_map });
    let self_type = Type::Struct(inner.clone());
    for (_, fty) in &inner.fields {
        selfref::propagate_self(fty, &self_type);
    }
    Ok(self_type)
}

pub fn union_(fields: Vec<(&str, Type)>) -> Result<Type, Error> {
    let fields: Vec<(String, Type)> = fields.into_iter().map(|(n, t)| (n.to_string(), t)).collect();
    let (offsets, size) = crate::layout::union_offsets(&fields)?;
    let mut field_map = HashMap::new();
    for ((fname, fty), off) in fields.iter().zip(offsets.iter()) {
        field_map.insert(fname.clone(), FieldEntry { offset: *off, ty: fty.clone() });
        promote_members(&mut field_map, fty, *off);
    }
    let inner = Arc::new(StructInner { name: String::new(), fields, offsets, size, field_map });
    Ok(Type::Union(inner))
}

pub fn array(elem: Type, len: Option<usize>) -> Type {
    Type::Array(Arc::new(ArrayInner { elem, len }))
}

pub fn bits(backing: Type, bit_width: u32, bit_offset: u32) -> Result<Type, Error> {
    let format = num_format(&backing)?;
    let backing_bits = format.size() * 8;
    if bit_offset as usize + bit_width as usize > backing_bits {
        return Err(Error::Overflow { bits: bit_offset as usize + bit_width as usize, backing_bits });
    }
    Ok(Type::Bits(Arc::new(BitsInner { format, bits: bit_width, bit_offset })))
}

pub fn bitfield(backing: Type, bit_list: Vec<(&str, u32)>) -> Result<Type, Error> {
    let backing_format = num_format(&backing)?;
    let backing_bits = backing_format.size() * 8;
    let mut fields = Vec::with_capacity(bit_list.len());
    let mut offset = 0u32;
    for (name, width) in bit_list {
        fields.push((
            name.to_string(),
            Type::Bits(Arc::new(BitsInner { format: backing_format.clone(), bits: width, bit_offset: offset })),
        ));
        offset += width;
    }
    if offset as usize > backing_bits {
        return Err(Error::Overflow { bits: offset as usize, backing_bits });
    }
    let mut field_map = HashMap::new();
    for (name, ty) in &fields {
        field_map.insert(name.clone(), FieldEntry { offset: 0, ty: ty.clone() });
    }
    Ok(Type::BitField(Arc::new(BitFieldInner {
        backing: backing_format,
        size: backing_format_size(&backing)?,
        fields,
        field_map,
    })))
}

fn num_format(ty: &Type) -> Result<Format, Error> {
    match ty {
        Type::Num(n) => Ok(n.format.clone()),
        other => Err(Error::Format(format!("expected a Num backing type, got {other:?}"))),
    }
}

fn backing_format_size(ty: &Type) -> Result<usize, Error> {
    Ok(num_format(ty)?.size())
}

pub fn str_(encoding: StrEncoding) -> Type {
    Type::Str(encoding)
}

pub fn void() -> Type {
    Type::Void
}

pub fn self_marker() -> Type {
    Type::SelfMarker
}

fn promote_members(map: &mut HashMap<String, FieldEntry>, ty: &Type, base_offset: usize) {
    match ty {
        Type::Union(u) => {
            for (name, member) in &u.fields {
                map.insert(name.clone(), FieldEntry { offset: base_offset, ty: member.clone() });
                promote_members(map, member, base_offset);
            }
        }
        Type::BitField(bf) => {
            for (name, member) in &bf.fields {
                map.insert(name.clone(), FieldEntry { offset: base_offset, ty: member.clone() });
            }
        }
        _ => {}
    }
}

// ---- introspection -----------------------------------------------------

impl Type {
    /// The static size in bytes, or `UnsizedError` for `Str`, unsized
    /// `Array`, `Void` and unbound `SelfMarker`.
    pub fn size(&self) -> Result<usize, Error> {
        match self {
            Type::Raw(r) => Ok(r.format.size()),
            Type::Num(n) => Ok(n.format.size()),
            Type::Ptr(p) => Ok(p.format.size()),
            Type::Struct(s) => Ok(s.size),
            Type::Union(u) => Ok(u.size),
            Type::Array(a) => match a.len {
                Some(len) => Ok(len * a.elem.size()?),
                None => Err(Error::Unsized("unsized Array has no static size".into())),
            },
            Type::Bits(b) => Ok(b.format.size()),
            Type::BitField(bf) => Ok(bf.size),
            Type::Str(_) => Err(Error::Unsized("Str is unsized".into())),
            Type::Void => Err(Error::Unsized("Void has no size".into())),
            Type::SelfMarker => Err(Error::Unsized("SelfMarker has no size until bound".into())),
        }
    }

    pub fn is_sized(&self) -> bool {
        self.size().is_ok()
    }

    /// Pack a single scalar value for `Num`, `Ptr` (the raw address) or
    /// `BitField` (the whole backing word).
    pub fn pack_value(&self, value: Value) -> Result<Vec<u8>, Error> {
        match self {
            Type::Num(n) => n.format.pack(&[value]),
            Type::Ptr(p) => p.format.pack(&[Value::from_addr(value.as_addr(), p.format.scalars[0])]),
            Type::BitField(bf) => bf.backing.pack(&[value]),
            other => Err(Error::Format(format!("{other:?} is not a scalar type"))),
        }
    }

    pub fn unpack_value(&self, bytes: &[u8]) -> Result<Value, Error> {
        match self {
            Type::Num(n) => Ok(n.format.unpack(bytes)?.remove(0)),
            Type::Ptr(p) => Ok(p.format.unpack(bytes)?.remove(0)),
            Type::BitField(bf) => Ok(bf.backing.unpack(bytes)?.remove(0)),
            other => Err(Error::Format(format!("{other:?} is not a scalar type"))),
        }
    }

    /// Pack/unpack the tuple of values a `Raw` format describes.
    pub fn pack_tuple(&self, values: &[Value]) -> Result<Vec<u8>, Error> {
        match self {
            Type::Raw(r) => r.format.pack(values),
            other => Err(Error::Format(format!("{other:?} is not a Raw tuple type"))),
        }
    }

    pub fn unpack_tuple(&self, bytes: &[u8]) -> Result<Vec<Value>, Error> {
        match self {
            Type::Raw(r) => r.format.unpack(bytes),
            other => Err(Error::Format(format!("{other:?} is not a Raw tuple type"))),
        }
    }

    pub fn fields(&self) -> Option<&[(String, Type)]> {
        match self {
            Type::Struct(s) => Some(&s.fields),
            Type::Union(u) => Some(&u.fields),
            Type::BitField(bf) => Some(&bf.fields),
            _ => None,
        }
    }

    pub fn field_map(&self) -> Option<&HashMap<String, FieldEntry>> {
        match self {
            Type::Struct(s) => Some(&s.field_map),
            Type::Union(u) => Some(&u.field_map),
            Type::BitField(bf) => Some(&bf.field_map),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Result<&FieldEntry, Error> {
        self.field_map()
            .and_then(|m| m.get(name))
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Type::Struct(s) => Some(&s.name),
            _ => None,
        }
    }

    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Array(a) => Some(&a.elem),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<Option<usize>> {
        match self {
            Type::Array(a) => Some(a.len),
            _ => None,
        }
    }

    pub fn dst_type(&self) -> Result<Type, Error> {
        match self {
            Type::Ptr(p) => p.dst_type(),
            other => Err(Error::Format(format!("{other:?} is not a Ptr"))),
        }
    }

    pub fn ptr_format(&self) -> Option<&Format> {
        match self {
            Type::Ptr(p) => Some(&p.format),
            _ => None,
        }
    }

    pub fn ptr_is_bound(&self) -> Option<bool> {
        match self {
            Type::Ptr(p) => Some(p.is_bound()),
            _ => None,
        }
    }

    pub fn str_encoding(&self) -> Option<StrEncoding> {
        match self {
            Type::Str(e) => Some(*e),
            _ => None,
        }
    }

    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Bits(b) => Some(b.bits),
            _ => None,
        }
    }

    pub fn bit_offset(&self) -> Option<u32> {
        match self {
            Type::Bits(b) => Some(b.bit_offset),
            _ => None,
        }
    }
}

// ---- structural equality / hashing -------------------------------------
//
// `spec.md`'s invariant carves out one exception: a `Struct` compares and
// hashes by `name` only, so that a self-referential field (a `Ptr` whose
// resolved target is the very struct containing it) does not recurse
// forever. `Union`/`BitField` are not self-referential in practice (nothing
// in this crate propagates self-binding into union members, matching the
// original source) so they compare their field lists in full.

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Raw(a), Type::Raw(b)) => a.format == b.format,
            (Type::Num(a), Type::Num(b)) => a.format == b.format,
            (Type::Ptr(a), Type::Ptr(b)) => {
                if a.format != b.format {
                    return false;
                }
                match (a.cell.get(), b.cell.get()) {
                    (Some(ta), Some(tb)) => ta == tb,
                    (None, None) => true,
                    _ => false,
                }
            }
            (Type::Struct(a), Type::Struct(b)) => a.name == b.name,
            (Type::Union(a), Type::Union(b)) => a.fields == b.fields,
            (Type::Array(a), Type::Array(b)) => a.elem == b.elem && a.len == b.len,
            (Type::Bits(a), Type::Bits(b)) => {
                a.format == b.format && a.bits == b.bits && a.bit_offset == b.bit_offset
            }
            (Type::BitField(a), Type::BitField(b)) => a.backing == b.backing && a.fields == b.fields,
            (Type::Str(a), Type::Str(b)) => a == b,
            (Type::Void, Type::Void) => true,
            (Type::SelfMarker, Type::SelfMarker) => true,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl std::hash::Hash for Type {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Raw(a) => a.format.hash(state),
            Type::Num(a) => a.format.hash(state),
            Type::Ptr(a) => {
                a.format.hash(state);
                if let Some(t) = a.cell.get() {
                    t.hash(state);
                }
            }
            Type::Struct(a) => a.name.hash(state),
            Type::Union(a) => a.fields.hash(state),
            Type::Array(a) => {
                a.elem.hash(state);
                a.len.hash(state);
            }
            Type::Bits(a) => {
                a.format.hash(state);
                a.bits.hash(state);
                a.bit_offset.hash(state);
            }
            Type::BitField(a) => {
                a.backing.hash(state);
                a.fields.hash(state);
            }
            Type::Str(a) => a.hash(state),
            Type::Void | Type::SelfMarker => {}
        }
    }
}

impl fmt::Debug for Type {
    // Deliberately shallow: a `Struct` only prints its name rather than
    // recursing into fields, since a self-referential field's resolved
    // target is this very struct (mirrors the PartialEq/Hash exception
    // above — recursing here would overflow the stack on a linked list
    // node's own descriptor).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Raw(r) => write!(f, "Raw({})", r.format.text),
            Type::Num(n) => write!(f, "Num({})", n.format.text),
            Type::Ptr(p) => write!(f, "Ptr({})", p.format.text),
            Type::Struct(s) => write!(f, "Struct({:?})", s.name),
            Type::Union(u) => write!(f, "Union({} fields)", u.fields.len()),
            Type::Array(a) => write!(f, "Array(len={:?})", a.len),
            Type::Bits(b) => write!(f, "Bits({}:{})", b.bit_offset, b.bit_offset + b.bits),
            Type::BitField(bf) => write!(f, "BitField({} fields)", bf.fields.len()),
            Type::Str(e) => write!(f, "Str({e:?})"),
            Type::Void => write!(f, "Void"),
            Type::SelfMarker => write!(f, "SelfMarker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_matches_field_order() {
        let s = struct_(
            "Example",
            vec![("a", num("B").unwrap()), ("b", num("<I").unwrap()), ("c", num("B").unwrap())],
        )
        .unwrap();
        assert_eq!(s.size().unwrap(), 6);
        assert_eq!(s.field("b").unwrap().offset, 1);
        assert_eq!(s.field("c").unwrap().offset, 5);
    }

    #[test]
    fn union_size_is_max_member() {
        let u = union_(vec![("a", num("B").unwrap()), ("b", num("<H").unwrap())]).unwrap();
        assert_eq!(u.size().unwrap(), 2);
        assert_eq!(u.field("a").unwrap().offset, 0);
        assert_eq!(u.field("b").unwrap().offset, 0);
    }

    #[test]
    fn ptr_size_is_its_own_format_not_targets() {
        let target = struct_("Big", vec![("x", num("<Q").unwrap()), ("y", num("<Q").unwrap())]).unwrap();
        let p4 = ptr("<I", target.clone()).unwrap();
        let p8 = ptr("<Q", target).unwrap();
        assert_eq!(p4.size().unwrap(), 4);
        assert_eq!(p8.size().unwrap(), 8);
    }

    #[test]
    fn self_reference_resolves_to_enclosing_struct() {
        let list_node = struct_(
            "ListNode",
            vec![("next", ptr("<I", self_marker()).unwrap()), ("data", ptr("<I", void()).unwrap())],
        )
        .unwrap();
        let next_field = list_node.field("next").unwrap();
        let resolved = next_field.ty.dst_type().unwrap();
        assert_eq!(resolved, list_node);
    }

    #[test]
    fn unbound_self_marker_fails() {
        let dangling = ptr("<I", self_marker()).unwrap();
        assert!(matches!(dangling.dst_type(), Err(Error::UnboundSelf)));
    }

    #[test]
    fn bitfield_overflow_is_rejected() {
        let backing = num("B").unwrap();
        let err = bitfield(backing, vec![("a", 5), ("b", 5)]).unwrap_err();
        assert!(matches!(err, Error::Overflow { .. }));
    }

    #[test]
    fn two_identical_struct_declarations_compare_equal() {
        let a = struct_("ListNode", vec![("next", ptr("<I", self_marker()).unwrap())]).unwrap();
        let b = struct_("ListNode", vec![("next", ptr("<I", self_marker()).unwrap())]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unsized_types_fail_size() {
        assert!(str_(StrEncoding::Ansi).size().is_err());
        assert!(array(num("B").unwrap(), None).size().is_err());
    }
}
