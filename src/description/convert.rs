//! Typed conversions out of the description tree.
//!
//! Integers accept an optional sign, decimal digits or a `0x` hexadecimal
//! prefix, then an optional `K`, `M` or `G` unit (powers of 1024). Octal
//! notation is not supported: `010` is ten.

use super::{NodeKind, Origin, Value};

/// Errors raised while converting or walking description nodes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot convert a {kind} node to `{target}` (at {origin})")]
    WrongKind {
        target: &'static str,
        kind: NodeKind,
        origin: Origin,
    },

    #[error("invalid value `{raw}` for type `{target}` (at {origin})")]
    InvalidValue {
        target: &'static str,
        raw: String,
        origin: Origin,
    },

    #[error("value `{raw}` is out of range for type `{target}` (at {origin})")]
    OutOfRange {
        target: &'static str,
        raw: String,
        origin: Origin,
    },

    #[error("cannot iterate over a {kind} node (at {origin})")]
    NotIterable { kind: NodeKind, origin: Origin },

    #[error("no converter registered for type `{0}`")]
    UnknownType(String),
}

/// A type that can be built from a description node.
pub trait FromValue: Sized {
    /// Name of the type in diagnostics and in the converter registry.
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntegerError {
    Invalid,
    Range,
}

impl IntegerError {
    pub(crate) fn into_conversion(self, target: &'static str, raw: &str, origin: Origin) -> ConversionError {
        let raw = raw.to_string();
        match self {
            IntegerError::Invalid => ConversionError::InvalidValue { target, raw, origin },
            IntegerError::Range => ConversionError::OutOfRange { target, raw, origin },
        }
    }
}

/// Parse an integer with an optional unit suffix.
///
/// # Arguments
/// * `text` - The text to parse
/// * `signed` - Whether a leading `-` is accepted
/// * `units` - Whether a `K`/`M`/`G` suffix is accepted
pub(crate) fn parse_integer(text: &str, signed: bool, units: bool) -> Result<i128, IntegerError> {
    let text = text.trim();

    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') if signed => (true, &text[1..]),
        Some(b'-') => return Err(IntegerError::Invalid),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, rest) = match rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        Some(hex) => (16, hex),
        None => (10, rest),
    };

    let digits_len = rest
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(rest.len());
    if digits_len == 0 {
        return Err(IntegerError::Invalid);
    }
    let (digits, suffix) = rest.split_at(digits_len);

    let magnitude = u128::from_str_radix(digits, radix).map_err(|_| IntegerError::Range)?;

    let factor: u128 = match suffix.trim() {
        "" => 1,
        "K" if units => 1 << 10,
        "M" if units => 1 << 20,
        "G" if units => 1 << 30,
        _ => return Err(IntegerError::Invalid),
    };

    let magnitude = magnitude
        .checked_mul(factor)
        .and_then(|m| i128::try_from(m).ok())
        .ok_or(IntegerError::Range)?;

    Ok(if negative { -magnitude } else { magnitude })
}

/// Raw text of a scalar, or a `WrongKind` error naming `target`.
pub(crate) fn scalar_text<'a>(value: &'a Value, target: &'static str) -> Result<&'a str, ConversionError> {
    value.raw().ok_or_else(|| ConversionError::WrongKind {
        target,
        kind: value.kind(),
        origin: value.origin(),
    })
}

macro_rules! integer_from_value {
    ($($ty:ty => $name:literal, signed: $signed:literal;)*) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let raw = scalar_text(value, Self::TYPE_NAME)?;
                    let n = parse_integer(raw, $signed, true)
                        .map_err(|e| e.into_conversion(Self::TYPE_NAME, raw, value.origin()))?;
                    <$ty>::try_from(n).map_err(|_| {
                        IntegerError::Range.into_conversion(Self::TYPE_NAME, raw, value.origin())
                    })
                }
            }
        )*
    };
}

integer_from_value! {
    i8 => "int8", signed: true;
    i16 => "int16", signed: true;
    i32 => "int32", signed: true;
    i64 => "int64", signed: true;
    u8 => "uint8", signed: false;
    u16 => "uint16", signed: false;
    u32 => "uint32", signed: false;
    u64 => "uint64", signed: false;
    usize => "size", signed: false;
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let raw = scalar_text(value, Self::TYPE_NAME)?;
        match parse_integer(raw, false, false) {
            Ok(0) => return Ok(false),
            Ok(1) => return Ok(true),
            Ok(_) => return Err(IntegerError::Range.into_conversion(Self::TYPE_NAME, raw, value.origin())),
            Err(_) => {}
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(IntegerError::Invalid.into_conversion(Self::TYPE_NAME, raw, value.origin())),
        }
    }
}

macro_rules! float_from_value {
    ($($ty:ty => $name:literal;)*) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let raw = scalar_text(value, Self::TYPE_NAME)?;
                    raw.trim().parse::<$ty>().map_err(|_| {
                        IntegerError::Invalid.into_conversion(Self::TYPE_NAME, raw, value.origin())
                    })
                }
            }
        )*
    };
}

float_from_value! {
    f32 => "float";
    f64 => "double";
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        scalar_text(value, Self::TYPE_NAME).map(str::to_string)
    }
}

/// Vectors convert element-wise, or from a comma separated scalar.
impl<T: FromValue> FromValue for Vec<T> {
    const TYPE_NAME: &'static str = "vector";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Vector(_) => value.entries()?.map(|(_, item)| item.parse::<T>()).collect(),
            Value::Scalar(node) => {
                if node.raw().trim().is_empty() {
                    return Ok(Vec::new());
                }
                node.raw()
                    .split(',')
                    .map(|token| {
                        Value::scalar(token.trim(), node.hint(), value.origin()).parse::<T>()
                    })
                    .collect()
            }
            other => Err(ConversionError::WrongKind {
                target: Self::TYPE_NAME,
                kind: other.kind(),
                origin: other.origin(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ScalarHint;

    fn s(raw: &str) -> Value {
        Value::string(raw)
    }

    #[test]
    fn test_integers() {
        assert_eq!(s("42").parse::<i32>(), Ok(42));
        assert_eq!(s("42").parse::<i32>().unwrap().to_string(), "42");
        assert_eq!(s("-1337").parse::<i64>(), Ok(-1337));
        assert_eq!(s("+5").parse::<u8>(), Ok(5));
        assert_eq!(s("  12  ").parse::<u16>(), Ok(12));
        assert_eq!(s("0x1000").parse::<u64>(), Ok(4096));
        assert_eq!(s("010").parse::<u32>(), Ok(10));
    }

    #[test]
    fn test_integer_units() {
        assert_eq!(s("4K").parse::<u32>(), Ok(4096));
        assert_eq!(s("4 K").parse::<u32>(), Ok(4096));
        assert_eq!(s("2M").parse::<u64>(), Ok(2 * 1024 * 1024));
        assert_eq!(s("1G").parse::<u64>(), Ok(1 << 30));
        assert_eq!(s("-1K").parse::<i32>(), Ok(-1024));
        assert!(s("4T").parse::<u32>().is_err());
        assert!(s("4KB").parse::<u32>().is_err());
    }

    #[test]
    fn test_integer_failures() {
        assert!(matches!(
            s("1234.56").parse::<i32>(),
            Err(ConversionError::InvalidValue { .. })
        ));
        assert!(matches!(
            s("-1").parse::<u32>(),
            Err(ConversionError::InvalidValue { .. })
        ));
        assert!(matches!(
            s("256").parse::<u8>(),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            s("4G").parse::<u32>(),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(s("").parse::<u32>().is_err());
        assert!(s("abc").parse::<u32>().is_err());
        assert!(Value::nil().parse::<u32>().is_err());
    }

    #[test]
    fn test_bool() {
        assert_eq!(s("1").parse::<bool>(), Ok(true));
        assert_eq!(s("0").parse::<bool>(), Ok(false));
        assert_eq!(s("true").parse::<bool>(), Ok(true));
        assert_eq!(s("TrUe").parse::<bool>(), Ok(true));
        assert_eq!(s("FALSE").parse::<bool>(), Ok(false));
        assert!(s("127").parse::<bool>().is_err());
        assert!(s("-1").parse::<bool>().is_err());
        assert!(s("1K").parse::<bool>().is_err());
        assert!(s("yes").parse::<bool>().is_err());
    }

    #[test]
    fn test_floats_and_strings() {
        assert_eq!(s("1234.5").parse::<f64>(), Ok(1234.5));
        assert_eq!(s("0.25").parse::<f32>(), Ok(0.25));
        assert!(s("x").parse::<f64>().is_err());
        assert_eq!(s(" raw text ").parse::<String>(), Ok(" raw text ".to_string()));
    }

    #[test]
    fn test_vectors() {
        let v = Value::vector(Origin::Unknown, vec![s("1"), s("2K")]);
        assert_eq!(v.parse::<Vec<u32>>(), Ok(vec![1, 2048]));

        let scalar = Value::scalar("1, 2,3", ScalarHint::Str, Origin::Cmdline);
        assert_eq!(scalar.parse::<Vec<u8>>(), Ok(vec![1, 2, 3]));
        assert_eq!(s("").parse::<Vec<u8>>(), Ok(vec![]));
        assert!(s("1,x").parse::<Vec<u8>>().is_err());
        assert!(Value::nil().parse::<Vec<u8>>().is_err());
    }

    #[test]
    fn test_parse_marks_converted_only_on_success() {
        let ok = s("3");
        let bad = s("three");
        ok.parse::<u8>().unwrap();
        assert!(bad.parse::<u8>().is_err());

        assert!(ok.is_converted());
        assert!(!bad.is_converted());
    }
}
