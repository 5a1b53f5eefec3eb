//! Pinned views: a `(vm, addr, Type)` triple with ergonomic field, pointer,
//! array and string accessors (`spec.md` §4.2–4.8).
//!
//! A `Pinned` is cheap and freely cloned/aliased — it borrows the `Vm` for
//! the lifetime of the view and owns its descriptor, but carries no lock of
//! its own, matching the aliasing model described on [`crate::vm::Vm`].
//! Owning the descriptor rather than borrowing it is what lets `deref`
//! follow a pointer to a resolved `SelfMarker` target without leaking:
//! `Type`'s variants are all `Arc`-backed, so cloning one (here, and
//! whenever `field`/`index`/`deref` hand out a child view) is a refcount
//! bump, not a deep copy. Every read goes straight through to the VM;
//! nothing here is cached except the descriptor shape (`crate::cache`).

use crate::alloc;
use crate::cache;
use crate::error::Error;
use crate::format::Value;
use crate::types::{StrEncoding, Type};
use crate::vm::{Addr, Vm};

/// A type descriptor pinned at a concrete address in a concrete VM.
#[derive(Clone)]
pub struct Pinned<'vm> {
    vm: &'vm dyn Vm,
    addr: Addr,
    ty: Type,
}

/// Pin `ty` at `addr` in `vm`. Mirrors the original module's free function
/// of the same name: callers are expected to call this on every access
/// rather than holding a view across VM mutations they don't control.
pub fn pin<'vm>(ty: &Type, vm: &'vm dyn Vm, addr: Addr) -> Pinned<'vm> {
    Pinned { vm, addr, ty: ty.clone() }
}

/// Pin a freshly allocated instance of `ty` in `vm`, asking the process-wide
/// allocator hook for the backing address (`spec.md` §4.9). Only statically
/// sized descriptors may be auto-allocated this way: an unsized `ty` fails
/// with [`Error::Unsized`] before the allocator is even consulted, and a
/// sized `ty` with no allocator installed fails with [`Error::NoAllocator`].
pub fn pin_alloc<'vm>(ty: &Type, vm: &'vm dyn Vm) -> Result<Pinned<'vm>, Error> {
    let size = ty.size()?;
    let addr = alloc::alloc_in(vm, size)?;
    Ok(pin(ty, vm, addr))
}

impl<'vm> Pinned<'vm> {
    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn size(&self) -> Result<usize, Error> {
        match cache::shape_for(&self.ty).size {
            Some(s) => Ok(s),
            None => self.ty.size(),
        }
    }

    /// The raw bytes this view currently occupies.
    pub fn raw(&self) -> Result<Vec<u8>, Error> {
        self.vm.read(self.addr, self.size()?)
    }

    /// Overwrite the view's bytes verbatim. The length must match exactly;
    /// partial overwrites go through `cast` to a smaller/differently-typed
    /// view first.
    pub fn set_raw(&self, bytes: &[u8]) -> Result<(), Error> {
        let expected = self.size()?;
        if bytes.len() != expected {
            return Err(Error::Shape(format!(
                "set_raw expected {expected} byte(s) for {:?}, got {}",
                self.ty,
                bytes.len()
            )));
        }
        self.vm.write(self.addr, bytes)
    }

    /// Assign from another pinned view of the identical descriptor shape,
    /// the aggregate counterpart to [`Pinned::set`] for scalars (`spec.md`
    /// §4.1: "`set` accepts either a pinned view of the same shape or...a
    /// primitive literal"). A `other` of a different `Type` is a
    /// `ShapeError`, not a reinterpreting cast — use [`Pinned::cast`] first
    /// if a bit-level reinterpretation is actually what's wanted.
    pub fn assign(&self, other: &Pinned<'_>) -> Result<(), Error> {
        if self.ty != other.ty {
            return Err(Error::Shape(format!(
                "cannot assign {:?} into a view of {:?}: shapes differ",
                other.ty, self.ty
            )));
        }
        self.set_raw(&other.raw()?)
    }

    /// Assign every element of a sized `Array` at once from a list of
    /// exactly [`Pinned::len`] values (`spec.md` §4.4). A shorter or longer
    /// `values` is a `ShapeError`; for a sub-range write, use
    /// [`Pinned::set_slice`].
    pub fn set_elements(&self, values: &[Value]) -> Result<(), Error> {
        let len = self.len()?;
        self.set_slice(0, len as i64, values)
    }

    /// Fill the view with a repeated byte.
    pub fn memset(&self, byte: u8) -> Result<(), Error> {
        let size = self.size()?;
        self.vm.write(self.addr, &vec![byte; size])
    }

    /// Reinterpret this address as a different descriptor.
    pub fn cast(&self, ty: &Type) -> Pinned<'vm> {
        Pinned { vm: self.vm, addr: self.addr, ty: ty.clone() }
    }

    /// `field(name).cast(ty)` in one call, the common "reinterpret this
    /// union member as something more specific" pattern (`spec.md` §4.3).
    pub fn cast_field(&self, name: &str, ty: &Type) -> Result<Pinned<'vm>, Error> {
        let f = self.field(name)?;
        Ok(Pinned { vm: self.vm, addr: f.addr, ty: ty.clone() })
    }

    /// Access a named field of a `Struct`/`Union`/`BitField` (including
    /// members promoted out of a nested union/bitfield).
    pub fn field(&self, name: &str) -> Result<Pinned<'vm>, Error> {
        let entry = self.ty.field(name)?;
        Ok(Pinned { vm: self.vm, addr: self.addr + entry.offset as u64, ty: entry.ty.clone() })
    }

    /// Read this view as a scalar (`Num`, the address word of a `Ptr`, or
    /// the whole backing word of a `BitField`).
    pub fn get(&self) -> Result<Value, Error> {
        match &self.ty {
            Type::Bits(_) => Ok(Value::U64(self.get_bits()?)),
            _ => {
                let bytes = self.raw()?;
                self.ty.unpack_value(&bytes)
            }
        }
    }

    /// Write a scalar value through this view.
    pub fn set(&self, value: Value) -> Result<(), Error> {
        match &self.ty {
            Type::Bits(_) => self.set_bits(value.as_addr()),
            _ => {
                let bytes = self.ty.pack_value(value)?;
                self.vm.write(self.addr, &bytes)
            }
        }
    }

    /// Read the `Raw` tuple this view packs.
    pub fn get_tuple(&self) -> Result<Vec<Value>, Error> {
        let bytes = self.raw()?;
        self.ty.unpack_tuple(&bytes)
    }

    pub fn set_tuple(&self, values: &[Value]) -> Result<(), Error> {
        let bytes = self.ty.pack_tuple(values)?;
        self.vm.write(self.addr, &bytes)
    }

    /// Read a `Bits` field's value out of its backing word.
    pub fn get_bits(&self) -> Result<u64, Error> {
        let bits = match &self.ty {
            Type::Bits(b) => b.as_ref(),
            other => return Err(Error::Format(format!("{other:?} is not a Bits field"))),
        };
        let bytes = self.vm.read(self.addr, bits.format.size())?;
        let raw = bits.format.unpack(&bytes)?.remove(0).as_addr();
        let mask = if bits.bits >= 64 { u64::MAX } else { (1u64 << bits.bits) - 1 };
        Ok((raw >> bits.bit_offset) & mask)
    }

    /// Read-modify-write a `Bits` field's value into its backing word. This
    /// requires a VM round trip (read the current word, splice in the new
    /// bits, write it back) since a bitfield's members are not individually
    /// addressable. A `value` wider than the field truncates silently to its
    /// low `n` bits (`spec.md` §4.5: "writes truncate silently to n bits"),
    /// matching scenario 4's `f1 = 5` on a 2-bit field storing `1`.
    pub fn set_bits(&self, value: u64) -> Result<(), Error> {
        let bits = match &self.ty {
            Type::Bits(b) => b.as_ref(),
            other => return Err(Error::Format(format!("{other:?} is not a Bits field"))),
        };
        let mask = if bits.bits >= 64 { u64::MAX } else { (1u64 << bits.bits) - 1 };
        let bytes = self.vm.read(self.addr, bits.format.size())?;
        let current = bits.format.unpack(&bytes)?.remove(0).as_addr();
        let cleared = current & !(mask << bits.bit_offset);
        let spliced = cleared | ((value & mask) << bits.bit_offset);
        let scalar = bits.format.scalars[0];
        let out = bits.format.pack(&[Value::from_addr(spliced, scalar)])?;
        self.vm.write(self.addr, &out)
    }

    /// Follow a `Ptr`, returning a view pinned at the address it currently
    /// holds and typed as its resolved destination.
    pub fn deref(&self) -> Result<Pinned<'vm>, Error> {
        let dst = self.ty.dst_type()?;
        let target_addr = self.get()?.as_addr();
        // `dst` is cloned out of the pointer's self cell (an `Arc`-backed
        // `Type`, cheap to clone) and moves straight into the returned
        // view's own `ty` field — nothing is leaked or boxed.
        Ok(Pinned { vm: self.vm, addr: target_addr, ty: dst })
    }

    /// Write `bytes` through this `Ptr`'s target address. If `expected_size`
    /// is given and doesn't match the pointer's resolved destination size,
    /// this logs a warning and proceeds anyway rather than failing — the
    /// write still has a well-defined length (`bytes.len()`), it just isn't
    /// the shape the pointer's static type predicts.
    pub fn deref_set(&self, bytes: &[u8]) -> Result<(), Error> {
        let dst = self.ty.dst_type()?;
        if let Ok(expected) = dst.size() {
            if expected != bytes.len() {
                tracing::warn!(
                    pointer = ?self.ty,
                    expected,
                    actual = bytes.len(),
                    "deref_set: byte length does not match the pointer's declared target shape, writing anyway"
                );
            }
        }
        let target_addr = self.get()?.as_addr();
        self.vm.write(target_addr, bytes)
    }

    /// `deref_set(view.raw())` in one call — the form `spec.md` §4.2
    /// actually describes (`deref_set(vm, addr, view)`): write a pinned
    /// view's bytes through this pointer's target address, warning rather
    /// than failing on a shape mismatch.
    pub fn deref_set_view(&self, view: &Pinned<'_>) -> Result<(), Error> {
        self.deref_set(&view.raw()?)
    }

    /// The element count of a sized `Array`.
    pub fn len(&self) -> Result<usize, Error> {
        match self.ty.array_len() {
            Some(Some(n)) => Ok(n),
            Some(None) => Err(Error::Unsized("unsized Array has no length".into())),
            None => Err(Error::Format(format!("{:?} is not an Array", self.ty))),
        }
    }

    /// Index into an `Array`, normalizing a negative index against the
    /// array's length the way the original source does (`-1` is the last
    /// element).
    pub fn index(&self, i: i64) -> Result<Pinned<'vm>, Error> {
        let elem = self.ty.elem().ok_or_else(|| Error::Format(format!("{:?} is not an Array", self.ty)))?;
        let elem_size = elem.size()?;
        let elem = elem.clone();
        let normalized = self.normalize_index(i)?;
        Ok(Pinned { vm: self.vm, addr: self.addr + (normalized * elem_size) as u64, ty: elem })
    }

    fn normalize_index(&self, i: i64) -> Result<usize, Error> {
        let len = self.ty.array_len().and_then(|l| l);
        let normalized = if i < 0 {
            match len {
                Some(len) => len as i64 + i,
                None => return Err(Error::Index { index: i, len: 0 }),
            }
        } else {
            i
        };
        if normalized < 0 || len.is_some_and(|len| normalized as usize >= len) {
            return Err(Error::Index { index: i, len: len.unwrap_or(0) });
        }
        Ok(normalized as usize)
    }

    /// `self[start..end]` over an `Array`, both bounds negative-index aware.
    /// Returns the element views in order.
    ///
    /// An unsized `Array` has no length to normalize a negative bound
    /// against or to clamp an overlong positive bound to, but `spec.md`
    /// §4.4 still allows index/slice access on one — only `size()` and
    /// auto-allocation are refused. So the length is consulted lazily, via
    /// [`Pinned::len`], only when a bound actually needs it (a negative
    /// bound, or clamping a positive one); an explicit non-negative
    /// `start`/`end` on an unsized array is taken as-is and walked with
    /// [`Pinned::index`], which itself accepts any non-negative index into
    /// an unsized array.
    pub fn slice(&self, start: i64, end: i64) -> Result<Vec<Pinned<'vm>>, Error> {
        let start = self.resolve_slice_bound(start)?;
        let end = self.resolve_slice_bound(end)?;
        let mut out = Vec::new();
        let mut idx = start;
        while idx < end {
            out.push(self.index(idx)?);
            idx += 1;
        }
        Ok(out)
    }

    fn resolve_slice_bound(&self, bound: i64) -> Result<i64, Error> {
        let array_len = self
            .ty
            .array_len()
            .ok_or_else(|| Error::Format(format!("{:?} is not an Array", self.ty)))?;
        if bound >= 0 {
            return Ok(match array_len {
                Some(len) => bound.min(len as i64),
                None => bound,
            });
        }
        // A negative bound normalizes against the length, same as
        // `normalize_index`; an unsized array has none to normalize
        // against.
        match array_len {
            Some(len) => Ok((len as i64 + bound).max(0)),
            None => Err(Error::Index { index: bound, len: 0 }),
        }
    }

    /// `self[start..end] = values`. The slice width (`end - start`) must
    /// match `values.len()` exactly; a mismatch is a `ShapeError`, not a
    /// truncating write.
    pub fn set_slice(&self, start: i64, end: i64, values: &[Value]) -> Result<(), Error> {
        let targets = self.slice(start, end)?;
        if targets.len() != values.len() {
            return Err(Error::Shape(format!(
                "slice of {} element(s) cannot be assigned {} value(s)",
                targets.len(),
                values.len()
            )));
        }
        for (target, value) in targets.iter().zip(values) {
            target.set(*value)?;
        }
        Ok(())
    }

    /// Scan and decode a NUL-terminated string starting at this view's
    /// address. `max_bytes` caps the scan so a corrupt/unterminated buffer
    /// can't run away reading the whole address space.
    pub fn str_get(&self, max_bytes: Option<usize>) -> Result<String, Error> {
        let encoding = self
            .ty
            .str_encoding()
            .ok_or_else(|| Error::Format(format!("{:?} is not a Str", self.ty)))?;
        match encoding {
            StrEncoding::Ansi => {
                let mut bytes = Vec::new();
                let mut offset = 0usize;
                loop {
                    if let Some(max) = max_bytes {
                        if offset >= max {
                            return Err(Error::Unsized("ansi string exceeded max_bytes without a NUL".into()));
                        }
                    }
                    let chunk = self.vm.read(self.addr + offset as u64, 1)?;
                    if chunk[0] == 0 {
                        break;
                    }
                    bytes.push(chunk[0]);
                    offset += 1;
                }
                // Latin-1: every byte maps 1:1 onto the first 256 Unicode
                // scalar values.
                Ok(bytes.into_iter().map(|b| b as char).collect())
            }
            StrEncoding::Utf16Le => {
                let mut units = Vec::new();
                let mut offset = 0usize;
                loop {
                    if let Some(max) = max_bytes {
                        if offset >= max {
                            return Err(Error::Unsized("utf16le string exceeded max_bytes without a NUL".into()));
                        }
                    }
                    let chunk = self.vm.read(self.addr + offset as u64, 2)?;
                    let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
                    if unit == 0 {
                        break;
                    }
                    units.push(unit);
                    offset += 2;
                }
                // BMP-only: surrogate pairs are not reassembled, matching
                // the documented limitation of the original encoder.
                String::from_utf16(&units).map_err(|e| Error::Format(e.to_string()))
            }
        }
    }

    /// Encode `s` and write it plus its terminator(s) at this view's
    /// address.
    pub fn str_set(&self, s: &str) -> Result<(), Error> {
        let encoding = self
            .ty
            .str_encoding()
            .ok_or_else(|| Error::Format(format!("{:?} is not a Str", self.ty)))?;
        let out = match encoding {
            StrEncoding::Ansi => {
                let mut bytes = Vec::with_capacity(s.chars().count() + 1);
                for c in s.chars() {
                    if c as u32 > 0xFF {
                        return Err(Error::Format(format!("'{c}' is not representable in ansi")));
                    }
                    bytes.push(c as u8);
                }
                bytes.push(0);
                bytes
            }
            StrEncoding::Utf16Le => {
                let mut bytes = Vec::with_capacity(s.len() * 2 + 2);
                for unit in s.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes.extend_from_slice(&[0, 0]);
                bytes
            }
        };
        self.vm.write(self.addr, &out)
    }

    /// Structural equality by bytes: true when both views are the same
    /// size and the VM currently holds identical bytes at both addresses.
    /// Distinct from [`PartialEq`] on [`Type`], which compares descriptors,
    /// not memory contents.
    pub fn bytes_eq(&self, other: &Pinned<'_>) -> Result<bool, Error> {
        Ok(self.raw()? == other.raw()?)
    }
}
