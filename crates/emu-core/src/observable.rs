//! Read-only state queries by dotted path.

use std::fmt;

use crate::Cycle;

/// Result of a state query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    /// Counters: events dispatched, bus grants, byte offsets.
    U64(u64),
    /// Audio DAC sample.
    I8(i8),
    /// Frame number.
    I64(i64),
    /// Master clock position. May be [`Cycle::NEVER`] for an empty slot.
    Cycle(Cycle),
    String(String),
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
            Value::U32(v) => write!(f, "{v:#010X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::Cycle(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i64 => I64,
    Cycle => Cycle,
    String => String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

/// A component whose state can be inspected without side effects.
pub trait Observable {
    /// Look up one property, e.g. `clock`, `disk.state` or `tod.counter`.
    /// `None` for a path the component does not know.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path `query` answers.
    fn query_paths(&self) -> &'static [&'static str];
}
