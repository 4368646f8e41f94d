//! Runtime converter registry.
//!
//! Component parameters are declared with a type name known only at run
//! time. The [`ConverterRegistry`] maps such names to a decode function
//! producing a dynamically typed [`ParamValue`].

use std::collections::BTreeMap;
use std::fmt;

use super::convert::{ConversionError, FromValue};
use super::{AddressRange, SimTime, Value};

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Time(SimTime),
    Range(AddressRange),
}

impl ParamValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Str(_) => "string",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "signed integer",
            ParamValue::UInt(_) => "unsigned integer",
            ParamValue::Float(_) => "floating point",
            ParamValue::Time(_) => "time",
            ParamValue::Range(_) => "address-range",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(n) => write!(f, "{}", n),
            ParamValue::UInt(n) => write!(f, "{}", n),
            ParamValue::Float(n) => write!(f, "{}", n),
            ParamValue::Time(t) => write!(f, "{}", t),
            ParamValue::Range(r) => write!(f, "{}", r),
        }
    }
}

macro_rules! param_from {
    ($variant:ident as $wide:ty: $($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::$variant(<$wide>::from(v))
                }
            }
        )*
    };
}

param_from!(Int as i64: i8, i16, i32, i64);
param_from!(UInt as u64: u8, u16, u32, u64);
param_from!(Float as f64: f32, f64);

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::UInt(v as u64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<SimTime> for ParamValue {
    fn from(v: SimTime) -> Self {
        ParamValue::Time(v)
    }
}

impl From<AddressRange> for ParamValue {
    fn from(v: AddressRange) -> Self {
        ParamValue::Range(v)
    }
}

/// Typed extraction out of a [`ParamValue`].
pub trait FromParam: Sized {
    fn from_param(value: &ParamValue) -> Option<Self>;
}

macro_rules! integer_from_param {
    ($($ty:ty),*) => {
        $(
            impl FromParam for $ty {
                fn from_param(value: &ParamValue) -> Option<Self> {
                    match value {
                        ParamValue::Int(n) => <$ty>::try_from(*n).ok(),
                        ParamValue::UInt(n) => <$ty>::try_from(*n).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

integer_from_param!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromParam for f64 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromParam for bool {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromParam for String {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromParam for SimTime {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromParam for AddressRange {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Range(r) => Some(*r),
            _ => None,
        }
    }
}

pub type DecodeFn = fn(&Value) -> Result<ParamValue, ConversionError>;

fn decode_as<T>(value: &Value) -> Result<ParamValue, ConversionError>
where
    T: FromValue + Into<ParamValue>,
{
    value.parse::<T>().map(Into::into)
}

/// Type name to decode function.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    decoders: BTreeMap<&'static str, DecodeFn>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in scalar converter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<String>();
        registry.register::<bool>();
        registry.register::<i8>();
        registry.register::<i16>();
        registry.register::<i32>();
        registry.register::<i64>();
        registry.register::<u8>();
        registry.register::<u16>();
        registry.register::<u32>();
        registry.register::<u64>();
        registry.register::<usize>();
        registry.register::<f32>();
        registry.register::<f64>();
        registry.register::<SimTime>();
        registry.register::<AddressRange>();
        registry
    }

    /// Register `T` under its [`FromValue::TYPE_NAME`].
    pub fn register<T>(&mut self)
    where
        T: FromValue + Into<ParamValue>,
    {
        self.decoders.insert(T::TYPE_NAME, decode_as::<T>);
    }

    /// Register a custom decode function under `name`.
    pub fn register_as(&mut self, name: &'static str, decode: DecodeFn) {
        self.decoders.insert(name, decode);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decode `value` as the type registered under `type_name`.
    pub fn decode(&self, type_name: &str, value: &Value) -> Result<ParamValue, ConversionError> {
        let decode = self
            .decoders
            .get(type_name)
            .ok_or_else(|| ConversionError::UnknownType(type_name.to_string()))?;
        decode(value)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
