//! # simgate-net::codec
//!
//! The compact binary encoding of typed values defined by IEC 61499. Each
//! value travels as one application-class tag byte followed by a fixed or
//! length-prefixed payload, big-endian, with no framing between values.
//! Floats are moved through their IEEE-754 bit pattern, never through a
//! lexical representation.
//!
//! Encoding is stateless; decoding is a pure function over a byte slice
//! so the subscriber can reassemble values across arbitrary read
//! boundaries.

use bytes::{BufMut, BytesMut};
use simgate_types::errors::CodecError;
use simgate_types::port::VarType;
use simgate_types::variable::Value;

/// Application-specific tag class flags (IEC 61499 uses no others here).
pub const CLASS_APPLICATION: u8 = 0x40;

/// Tag byte of BOOL false.
pub const TAG_BOOL0: u8 = CLASS_APPLICATION;
/// Tag byte of BOOL true.
pub const TAG_BOOL1: u8 = CLASS_APPLICATION | 0x01;
/// Tag byte of DINT (32-bit two's complement).
pub const TAG_DINT: u8 = CLASS_APPLICATION | 0x04;
/// Tag byte of REAL (IEEE-754 single).
pub const TAG_REAL: u8 = CLASS_APPLICATION | 0x0a;
/// Tag byte of LREAL (IEEE-754 double).
pub const TAG_LREAL: u8 = CLASS_APPLICATION | 0x0b;
/// Tag byte of STRING (16-bit length prefix, raw bytes).
pub const TAG_STRING: u8 = CLASS_APPLICATION | 0x10;

/// The on-the-wire shape of a value, independent of the source type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireType {
    Real,
    LReal,
    Dint,
    Bool,
    Str,
}

impl WireType {
    /// Resolves a configured encoding name.
    pub fn parse(name: &str) -> Option<WireType> {
        match name {
            "REAL" => Some(WireType::Real),
            "LREAL" => Some(WireType::LReal),
            "DINT" => Some(WireType::Dint),
            "BOOL" => Some(WireType::Bool),
            "STRING" => Some(WireType::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WireType::Real => "REAL",
            WireType::LReal => "LREAL",
            WireType::Dint => "DINT",
            WireType::Bool => "BOOL",
            WireType::Str => "STRING",
        }
    }

    /// The loss-minimizing wire type of a source variable type. Unknown
    /// variables cannot be encoded.
    pub fn default_for(ty: VarType) -> Option<WireType> {
        match ty {
            VarType::Real => Some(WireType::LReal),
            VarType::Integer => Some(WireType::Dint),
            VarType::Boolean => Some(WireType::Bool),
            VarType::String => Some(WireType::Str),
            VarType::Unknown => None,
        }
    }

    /// Whether a source variable type may be cast onto this wire type.
    /// Anything not listed here is rejected during channel configuration.
    pub fn accepts(self, ty: VarType) -> bool {
        matches!(
            (ty, self),
            (VarType::Real, WireType::Real)
                | (VarType::Real, WireType::LReal)
                | (VarType::Integer, WireType::Dint)
                | (VarType::Boolean, WireType::Bool)
                | (VarType::String, WireType::Str)
        )
    }
}

/// Appends the compact encoding of `value` as `wire` to the buffer.
///
/// A real narrowed to REAL is rounded best-effort. The buffer is left
/// untouched when the value cannot be encoded.
pub fn encode_value(buf: &mut BytesMut, wire: WireType, value: &Value) -> Result<(), CodecError> {
    let cast_error = || CodecError::UnsupportedCast {
        src: value
            .ty()
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "empty".to_string()),
        wire: wire.name().to_string(),
    };
    match wire {
        WireType::LReal => {
            let v = value.as_real().ok_or_else(cast_error)?;
            buf.put_u8(TAG_LREAL);
            buf.put_u64(v.to_bits());
        }
        WireType::Real => {
            let v = value.as_real().ok_or_else(cast_error)?;
            buf.put_u8(TAG_REAL);
            buf.put_u32((v as f32).to_bits());
        }
        WireType::Dint => {
            let v = value.as_integer().ok_or_else(cast_error)?;
            buf.put_u8(TAG_DINT);
            buf.put_i32(v);
        }
        WireType::Bool => {
            let v = value.as_boolean().ok_or_else(cast_error)?;
            buf.put_u8(if v { TAG_BOOL1 } else { TAG_BOOL0 });
        }
        WireType::Str => {
            let v = value.as_text().ok_or_else(cast_error)?;
            if v.len() > u16::MAX as usize {
                return Err(CodecError::StringTooLong { len: v.len() });
            }
            buf.put_u8(TAG_STRING);
            buf.put_u16(v.len() as u16);
            buf.put_slice(v.as_bytes());
        }
    }
    Ok(())
}

/// The result of one incremental decode step.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// One variable parsed; `consumed` bytes are spent.
    Ok { value: Value, consumed: usize },
    /// A well-formed value that cannot be converted to the expected type;
    /// `consumed` bytes are spent and the port slot is skipped.
    TypeMismatch { consumed: usize },
    /// The tag byte is unknown; one byte is spent, parsing keeps going.
    InvalidTag,
    /// More input is required; nothing is spent. `needed` is a hint for
    /// the number of additional bytes.
    Incomplete { needed: usize },
}

/// Decodes the next value from `buf`, converting it to `expected`.
///
/// The function never consumes on `Incomplete`, so it can be re-run once
/// more data was appended to the reassembly buffer.
pub fn decode_value(buf: &[u8], expected: VarType) -> ParseOutcome {
    let Some(&tag) = buf.first() else {
        return ParseOutcome::Incomplete { needed: 1 };
    };
    match tag {
        TAG_BOOL0 | TAG_BOOL1 => convert(Value::Boolean(tag == TAG_BOOL1), expected, 1),
        TAG_DINT => match fixed_payload::<4>(buf) {
            Err(needed) => ParseOutcome::Incomplete { needed },
            Ok(raw) => convert(Value::Integer(i32::from_be_bytes(raw)), expected, 5),
        },
        TAG_REAL => match fixed_payload::<4>(buf) {
            Err(needed) => ParseOutcome::Incomplete { needed },
            Ok(raw) => {
                let v = f32::from_bits(u32::from_be_bytes(raw));
                convert(Value::Real(f64::from(v)), expected, 5)
            }
        },
        TAG_LREAL => match fixed_payload::<8>(buf) {
            Err(needed) => ParseOutcome::Incomplete { needed },
            Ok(raw) => convert(Value::Real(f64::from_bits(u64::from_be_bytes(raw))), expected, 9),
        },
        TAG_STRING => {
            if buf.len() < 3 {
                return ParseOutcome::Incomplete {
                    needed: 3 - buf.len(),
                };
            }
            let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
            let total = 3 + len;
            if buf.len() < total {
                return ParseOutcome::Incomplete {
                    needed: total - buf.len(),
                };
            }
            let text = String::from_utf8_lossy(&buf[3..total]).into_owned();
            convert(Value::Text(text), expected, total)
        }
        _ => ParseOutcome::InvalidTag,
    }
}

/// Reads the `N`-byte payload following the tag, or reports the number of
/// missing bytes.
fn fixed_payload<const N: usize>(buf: &[u8]) -> Result<[u8; N], usize> {
    if buf.len() < N + 1 {
        return Err(N + 1 - buf.len());
    }
    let mut raw = [0u8; N];
    raw.copy_from_slice(&buf[1..=N]);
    Ok(raw)
}

/// Converts a decoded value to the expected port type. REAL widens to the
/// Real port type; everything else converts only to its own type.
fn convert(value: Value, expected: VarType, consumed: usize) -> ParseOutcome {
    let matches = match (&value, expected) {
        (Value::Real(_), VarType::Real) => true,
        (Value::Integer(_), VarType::Integer) => true,
        (Value::Boolean(_), VarType::Boolean) => true,
        (Value::Text(_), VarType::String) => true,
        _ => false,
    };
    if matches {
        ParseOutcome::Ok { value, consumed }
    } else {
        ParseOutcome::TypeMismatch { consumed }
    }
}
