pub mod error;

use std::fmt;
use std::ops::BitOr;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::context::ContextRef;
pub use error::ErrorValue;

/// One bit per value variant, used by the constraint matcher.
///
/// A constraint position stores a union of these bits; an input matches the
/// position when its own bit is inside the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeFlags(pub u16);

impl TypeFlags {
    pub const NUMBER: TypeFlags = TypeFlags(1 << 0);
    pub const STRING: TypeFlags = TypeFlags(1 << 1);
    pub const BOOLEAN: TypeFlags = TypeFlags(1 << 2);
    pub const NULL: TypeFlags = TypeFlags(1 << 3);
    pub const VECTOR: TypeFlags = TypeFlags(1 << 4);
    pub const RANGE: TypeFlags = TypeFlags(1 << 5);
    pub const CONTEXT: TypeFlags = TypeFlags(1 << 6);
    pub const ERROR: TypeFlags = TypeFlags(1 << 7);
    pub const ANY: TypeFlags = TypeFlags(0xff);

    /// Whether `input` (a single-variant flag) is inside this mask.
    pub fn accepts(self, input: TypeFlags) -> bool {
        self.0 & input.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TypeFlags {
    type Output = TypeFlags;

    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TypeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TypeFlags, &str); 8] = [
            (TypeFlags::NUMBER, "number"),
            (TypeFlags::STRING, "string"),
            (TypeFlags::BOOLEAN, "boolean"),
            (TypeFlags::NULL, "null"),
            (TypeFlags::VECTOR, "vector"),
            (TypeFlags::RANGE, "range"),
            (TypeFlags::CONTEXT, "context"),
            (TypeFlags::ERROR, "error"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.accepts(flag) {
                if !first {
                    write!(f, "|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// A from/to pair supporting containment and indexed offset.
///
/// Steps by one from `from` toward `to`, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub from: f64,
    pub to: f64,
}

impl RangeValue {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, x: f64) -> bool {
        let (lo, hi) = if self.from <= self.to {
            (self.from, self.to)
        } else {
            (self.to, self.from)
        };
        lo <= x && x <= hi
    }

    /// Number of unit steps covered, inclusive.
    pub fn len(&self) -> usize {
        ((self.from - self.to).abs().floor() as usize) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Offset `index` steps from `from` toward `to`.
    pub fn at(&self, index: usize) -> Option<f64> {
        if index >= self.len() {
            return None;
        }
        let step = if self.from <= self.to { 1.0 } else { -1.0 };
        Some(self.from + step * index as f64)
    }
}

/// Result of evaluating any node: an immutable tagged union.
///
/// Expected failure modes are `Value::Error`, never panics; errors flow
/// through the graph like any other value.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Vector(Vec<Value>),
    Range(RangeValue),
    /// A value that is also a navigable context.
    Context(ContextRef),
    Error(Box<ErrorValue>),
}

impl Value {
    pub fn error(err: ErrorValue) -> Value {
        Value::Error(Box::new(err))
    }

    /// The discriminant bit for this variant.
    pub fn flags(&self) -> TypeFlags {
        match self {
            Value::Number(_) => TypeFlags::NUMBER,
            Value::Str(_) => TypeFlags::STRING,
            Value::Bool(_) => TypeFlags::BOOLEAN,
            Value::Null => TypeFlags::NULL,
            Value::Vector(_) => TypeFlags::VECTOR,
            Value::Range(_) => TypeFlags::RANGE,
            Value::Context(_) => TypeFlags::CONTEXT,
            Value::Error(_) => TypeFlags::ERROR,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::Vector(_) => "vector",
            Value::Range(_) => "range",
            Value::Context(_) => "context",
            Value::Error(_) => "error",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Context(a), Value::Context(b)) => a.same(b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// Render a number without a trailing `.0` when it is integral.
pub(crate) fn format_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => format_number(f, *n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Vector(elements) => {
                write!(f, "{{")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
            Value::Range(r) => {
                format_number(f, r.from)?;
                write!(f, ":")?;
                format_number(f, r.to)
            }
            Value::Context(_) => write!(f, "<context>"),
            Value::Error(e) => write!(f, "#err({})", e),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
            Value::Vector(elements) => {
                let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                for e in elements {
                    seq.serialize_element(e)?;
                }
                seq.end()
            }
            Value::Range(r) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("from", &r.from)?;
                map.serialize_entry("to", &r.to)?;
                map.end()
            }
            Value::Context(_) => serializer.serialize_str("<context>"),
            Value::Error(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", &e.to_string())?;
                map.end()
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_match_variant() {
        assert_eq!(Value::Number(1.0).flags(), TypeFlags::NUMBER);
        assert_eq!(Value::Null.flags(), TypeFlags::NULL);
        assert_eq!(Value::Vector(vec![]).flags(), TypeFlags::VECTOR);
        assert!(TypeFlags::ANY.accepts(Value::Bool(true).flags()));
        assert!(!TypeFlags::NUMBER.accepts(TypeFlags::STRING));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(11.0).to_string(), "11");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(
            Value::Vector(vec![Value::Number(1.0), Value::Number(2.0)]).to_string(),
            "{1, 2}"
        );
        assert_eq!(Value::Range(RangeValue::new(1.0, 5.0)).to_string(), "1:5");
    }

    #[test]
    fn test_range_containment_and_offset() {
        let r = RangeValue::new(2.0, 6.0);
        assert!(r.contains(2.0));
        assert!(r.contains(6.0));
        assert!(!r.contains(6.5));
        assert_eq!(r.len(), 5);
        assert_eq!(r.at(0), Some(2.0));
        assert_eq!(r.at(4), Some(6.0));
        assert_eq!(r.at(5), None);

        let rev = RangeValue::new(6.0, 2.0);
        assert!(rev.contains(3.0));
        assert_eq!(rev.at(1), Some(5.0));
    }

    #[test]
    fn test_serialize() {
        let v = Value::Vector(vec![Value::Number(1.0), Value::Str("a".into()), Value::Null]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[1.0,"a",null]"#);
    }
}
