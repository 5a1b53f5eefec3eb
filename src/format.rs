//! Parsing of `struct`-style format strings and the dynamic [`Value`] used to
//! move scalars in and out of [`crate::types::Type`] descriptors.
//!
//! Format strings follow the same convention as the original Python module
//! this crate overlays: an optional leading byte-order marker (`<` little,
//! `>` big, `=`/`@` native) followed by one-or-more type characters drawn
//! from `B H I Q b h i q f d`.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

use crate::error::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Endian {
    Little,
    Big,
    Native,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Scalar {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl Scalar {
    pub fn size(self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 | Scalar::F32 => 4,
            Scalar::U64 | Scalar::I64 | Scalar::F64 => 8,
        }
    }

    fn from_char(c: char) -> Option<Scalar> {
        Some(match c {
            'B' => Scalar::U8,
            'b' => Scalar::I8,
            'H' => Scalar::U16,
            'h' => Scalar::I16,
            'I' => Scalar::U32,
            'i' => Scalar::I32,
            'Q' => Scalar::U64,
            'q' => Scalar::I64,
            'f' => Scalar::F32,
            'd' => Scalar::F64,
            _ => return None,
        })
    }
}

/// A parsed format string: an endianness and the sequence of scalar fields
/// it packs/unpacks as a tuple.
///
/// Equality and hashing only consider `endian`/`scalars`: `"<I"` and `"I"`
/// (little endian is the default with no prefix) describe the same layout
/// and must compare equal, so the original source text is carried for
/// diagnostics only.
#[derive(Clone, Debug)]
pub struct Format {
    pub endian: Endian,
    pub scalars: Vec<Scalar>,
    pub text: String,
}

impl PartialEq for Format {
    fn eq(&self, other: &Format) -> bool {
        self.endian == other.endian && self.scalars == other.scalars
    }
}

impl Eq for Format {}

impl std::hash::Hash for Format {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.endian.hash(state);
        self.scalars.hash(state);
    }
}

impl Format {
    pub fn parse(fmt: &str) -> Result<Format, Error> {
        let mut chars = fmt.chars().peekable();
        let endian = match chars.peek() {
            Some('<') => {
                chars.next();
                Endian::Little
            }
            Some('>') => {
                chars.next();
                Endian::Big
            }
            Some('=') | Some('@') => {
                chars.next();
                Endian::Native
            }
            _ => Endian::Little,
        };
        let mut scalars = Vec::new();
        for c in chars {
            let scalar = Scalar::from_char(c)
                .ok_or_else(|| Error::Format(format!("unknown format character '{c}' in '{fmt}'")))?;
            scalars.push(scalar);
        }
        if scalars.is_empty() {
            return Err(Error::Format(format!("empty format string '{fmt}'")));
        }
        Ok(Format { endian, scalars, text: fmt.to_string() })
    }

    pub fn size(&self) -> usize {
        self.scalars.iter().map(|s| s.size()).sum()
    }

    pub fn pack(&self, values: &[Value]) -> Result<Vec<u8>, Error> {
        if values.len() != self.scalars.len() {
            return Err(Error::Format(format!(
                "format '{}' expects {} value(s), got {}",
                self.text,
                self.scalars.len(),
                values.len()
            )));
        }
        let mut out = Vec::with_capacity(self.size());
        for (scalar, value) in self.scalars.iter().zip(values) {
            out.extend(pack_scalar(self.endian, *scalar, *value)?);
        }
        Ok(out)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<Vec<Value>, Error> {
        if bytes.len() != self.size() {
            return Err(Error::Format(format!(
                "format '{}' expects {} byte(s), got {}",
                self.text,
                self.size(),
                bytes.len()
            )));
        }
        let mut out = Vec::with_capacity(self.scalars.len());
        let mut offset = 0;
        for scalar in &self.scalars {
            let n = scalar.size();
            out.push(unpack_scalar(self.endian, *scalar, &bytes[offset..offset + n]));
            offset += n;
        }
        Ok(out)
    }
}

/// A dynamically-typed scalar value, the unit of exchange for `Num`/`Raw`
/// descriptors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Interpret this value as an address (used by `Ptr` to read/write the
    /// pointee address regardless of the backing scalar width).
    pub fn as_addr(self) -> u64 {
        match self {
            Value::U8(v) => v as u64,
            Value::I8(v) => v as u64,
            Value::U16(v) => v as u64,
            Value::I16(v) => v as u64,
            Value::U32(v) => v as u64,
            Value::I32(v) => v as u64,
            Value::U64(v) => v,
            Value::I64(v) => v as u64,
            Value::F32(_) | Value::F64(_) => 0,
        }
    }

    /// Build a value of the given scalar kind from an address, truncating to
    /// the scalar's width (the same "verbatim subject to the format" rule the
    /// spec gives for writing an integer through a `Ptr`).
    pub fn from_addr(addr: u64, scalar: Scalar) -> Value {
        match scalar {
            Scalar::U8 => Value::U8(addr as u8),
            Scalar::I8 => Value::I8(addr as i8),
            Scalar::U16 => Value::U16(addr as u16),
            Scalar::I16 => Value::I16(addr as i16),
            Scalar::U32 => Value::U32(addr as u32),
            Scalar::I32 => Value::I32(addr as i32),
            Scalar::U64 => Value::U64(addr),
            Scalar::I64 => Value::I64(addr as i64),
            Scalar::F32 => Value::F32(addr as f32),
            Scalar::F64 => Value::F64(addr as f64),
        }
    }

    pub fn scalar(self) -> Scalar {
        match self {
            Value::U8(_) => Scalar::U8,
            Value::I8(_) => Scalar::I8,
            Value::U16(_) => Scalar::U16,
            Value::I16(_) => Scalar::I16,
            Value::U32(_) => Scalar::U32,
            Value::I32(_) => Scalar::I32,
            Value::U64(_) => Scalar::U64,
            Value::I64(_) => Scalar::I64,
            Value::F32(_) => Scalar::F32,
            Value::F64(_) => Scalar::F64,
        }
    }
}

fn pack_scalar(endian: Endian, scalar: Scalar, value: Value) -> Result<Vec<u8>, Error> {
    // A value of the "wrong" kind is still packed by reinterpreting it as
    // the target scalar's bit pattern via its address-sized representation,
    // matching Num's "one-value format" contract: callers are expected to
    // supply a value produced by the same scalar, but integers are freely
    // interchangeable the way Python ints are.
    let mut buf = vec![0u8; scalar.size()];
    macro_rules! put_int {
        ($fn:ident, $as:ty) => {{
            let v = value.as_addr() as $as;
            match endian {
                Endian::Little => LittleEndian::$fn(&mut buf, v),
                Endian::Big => BigEndian::$fn(&mut buf, v),
                Endian::Native => NativeEndian::$fn(&mut buf, v),
            }
        }};
    }
    match scalar {
        Scalar::U8 => buf[0] = value.as_addr() as u8,
        Scalar::I8 => buf[0] = value.as_addr() as u8,
        Scalar::U16 => put_int!(write_u16, u16),
        Scalar::I16 => put_int!(write_i16, i16),
        Scalar::U32 => put_int!(write_u32, u32),
        Scalar::I32 => put_int!(write_i32, i32),
        Scalar::U64 => put_int!(write_u64, u64),
        Scalar::I64 => put_int!(write_i64, i64),
        Scalar::F32 => {
            let v = match value {
                Value::F32(v) => v,
                Value::F64(v) => v as f32,
                other => other.as_addr() as f32,
            };
            match endian {
                Endian::Little => LittleEndian::write_f32(&mut buf, v),
                Endian::Big => BigEndian::write_f32(&mut buf, v),
                Endian::Native => NativeEndian::write_f32(&mut buf, v),
            }
        }
        Scalar::F64 => {
            let v = match value {
                Value::F32(v) => v as f64,
                Value::F64(v) => v,
                other => other.as_addr() as f64,
            };
            match endian {
                Endian::Little => LittleEndian::write_f64(&mut buf, v),
                Endian::Big => BigEndian::write_f64(&mut buf, v),
                Endian::Native => NativeEndian::write_f64(&mut buf, v),
            }
        }
    }
    Ok(buf)
}

fn unpack_scalar(endian: Endian, scalar: Scalar, bytes: &[u8]) -> Value {
    macro_rules! get_int {
        ($fn:ident) => {
            match endian {
                Endian::Little => LittleEndian::$fn(bytes),
                Endian::Big => BigEndian::$fn(bytes),
                Endian::Native => NativeEndian::$fn(bytes),
            }
        };
    }
    match scalar {
        Scalar::U8 => Value::U8(bytes[0]),
        Scalar::I8 => Value::I8(bytes[0] as i8),
        Scalar::U16 => Value::U16(get_int!(read_u16)),
        Scalar::I16 => Value::I16(get_int!(read_i16)),
        Scalar::U32 => Value::U32(get_int!(read_u32)),
        Scalar::I32 => Value::I32(get_int!(read_i32)),
        Scalar::U64 => Value::U64(get_int!(read_u64)),
        Scalar::I64 => Value::I64(get_int!(read_i64)),
        Scalar::F32 => Value::F32(get_int!(read_f32)),
        Scalar::F64 => Value::F64(get_int!(read_f64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endianness_prefixes() {
        let f = Format::parse("<I").unwrap();
        assert_eq!(f.endian, Endian::Little);
        assert_eq!(f.scalars, vec![Scalar::U32]);
        assert_eq!(f.size(), 4);

        let f = Format::parse(">Q").unwrap();
        assert_eq!(f.endian, Endian::Big);
        assert_eq!(f.size(), 8);
    }

    #[test]
    fn rejects_unknown_chars() {
        assert!(Format::parse("<Z").is_err());
        assert!(Format::parse("<").is_err());
    }

    #[test]
    fn round_trips_multi_field_raw() {
        let f = Format::parse("<BI").unwrap();
        let values = vec![Value::U8(0x12), Value::U32(0x04030201)];
        let packed = f.pack(&values).unwrap();
        assert_eq!(packed, vec![0x12, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(f.unpack(&packed).unwrap(), values);
    }

    #[test]
    fn pack_wrong_arity_fails() {
        let f = Format::parse("<I").unwrap();
        assert!(f.pack(&[Value::U32(1), Value::U32(2)]).is_err());
    }
}
