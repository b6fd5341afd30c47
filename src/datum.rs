//! Column data types and values.
//!
//! [`Type`] describes a declared column type and [`Value`] holds a single
//! typed column value. Values are what the maintenance code moves between
//! heap rows and index entries, so this module also defines the two
//! comparisons that work needs:
//!
//! - [`Value::null_aware_eq`]: the equality used when verifying that an index
//!   entry matches its heap row (NULL equals NULL).
//! - [`Value::total_cmp`]: a total order used by index storage to keep
//!   entries sorted, including NULLs and floating point edge cases.

use std::cmp::Ordering;
use std::fmt;

/// Database data type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean type.
    Bool,
    /// Variable-length binary string.
    Bytea,
    /// 2-byte integer.
    Int2,
    /// 4-byte integer.
    Int4,
    /// 8-byte integer.
    Int8,
    /// Single-precision floating-point.
    Float4,
    /// Double-precision floating-point.
    Float8,
    /// Variable-length string.
    Text,
    /// Variable-length string with limit.
    Varchar,
}

impl Type {
    /// Returns true if `value` can be stored in a column of this type.
    ///
    /// NULL is accepted by every type; nullability is a constraint concern
    /// and is not checked here.
    pub fn accepts(self, value: &Value) -> bool {
        match value.data_type() {
            None => true,
            Some(Type::Text) => matches!(self, Type::Text | Type::Varchar),
            Some(ty) => ty == self,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Bool => "boolean",
            Type::Bytea => "bytea",
            Type::Int2 => "smallint",
            Type::Int4 => "integer",
            Type::Int8 => "bigint",
            Type::Float4 => "real",
            Type::Float8 => "double precision",
            Type::Text => "text",
            Type::Varchar => "character varying",
        };
        write!(f, "{}", name)
    }
}

/// A typed database value.
///
/// This represents a single column value with its concrete type.
/// Variable-length types (Text, Bytea) are heap-allocated.
///
/// The derived `PartialEq` is plain structural equality. Code that compares
/// index keys against heap rows must use [`null_aware_eq`](Self::null_aware_eq).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL (type is unknown/any).
    Null,
    /// Boolean (true/false).
    Boolean(bool),
    /// 16-bit signed integer (SMALLINT).
    Int16(i16),
    /// 32-bit signed integer (INTEGER).
    Int32(i32),
    /// 64-bit signed integer (BIGINT).
    Int64(i64),
    /// 32-bit floating point (REAL).
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION).
    Float64(f64),
    /// Variable-length text (TEXT, VARCHAR).
    Text(String),
    /// Variable-length binary (BYTEA).
    Bytea(Vec<u8>),
}

impl Value {
    /// Returns the data type for this value, or `None` for Null.
    pub fn data_type(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(Type::Bool),
            Value::Int16(_) => Some(Type::Int2),
            Value::Int32(_) => Some(Type::Int4),
            Value::Int64(_) => Some(Type::Int8),
            Value::Float32(_) => Some(Type::Float4),
            Value::Float64(_) => Some(Type::Float8),
            Value::Text(_) => Some(Type::Text),
            Value::Bytea(_) => Some(Type::Bytea),
        }
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the stored size in bytes.
    ///
    /// For NULL, this returns 0 (NULL values are indicated by the null bitmap).
    /// For variable-length types, this includes the 4-byte length prefix.
    pub fn serialized_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int16(_) => 2,
            Value::Int32(_) => 4,
            Value::Int64(_) => 8,
            Value::Float32(_) => 4,
            Value::Float64(_) => 8,
            Value::Text(s) => 4 + s.len(),
            Value::Bytea(b) => 4 + b.len(),
        }
    }

    /// Equality where two NULLs compare equal.
    ///
    /// Floats compare by bit pattern so that a NaN stored in the heap matches
    /// the same NaN copied into an index entry.
    pub fn null_aware_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    /// Total order over values.
    ///
    /// NULL sorts first. Values of different types order by a fixed type
    /// rank; within a type the natural order is used, with `f32::total_cmp`
    /// / `f64::total_cmp` for floats.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int16(a), Value::Int16(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float32(a), Value::Float32(b)) => a.total_cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytea(a), Value::Bytea(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int16(_) => 2,
            Value::Int32(_) => 3,
            Value::Int64(_) => 4,
            Value::Float32(_) => 5,
            Value::Float64(_) => 6,
            Value::Text(_) => 7,
            Value::Bytea(_) => 8,
        }
    }

    /// Converts this value to its text representation.
    ///
    /// Booleans render as `"t"`/`"f"`, bytea as hex with a `"\\x"` prefix,
    /// and floats via [`format_float()`].
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => (if *b { "t" } else { "f" }).to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Float32(n) => format_float(*n as f64),
            Value::Float64(n) => format_float(*n),
            Value::Text(s) => s.clone(),
            Value::Bytea(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("\\x{}", hex)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

/// Formats a float value using SQL text conventions for special values.
fn format_float(n: f64) -> String {
    if n.is_infinite() {
        if n.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_aware_eq() {
        assert!(Value::Null.null_aware_eq(&Value::Null));
        assert!(!Value::Null.null_aware_eq(&Value::Int32(0)));
        assert!(!Value::Int32(0).null_aware_eq(&Value::Null));
        assert!(Value::Int32(7).null_aware_eq(&Value::Int32(7)));
        assert!(!Value::Int32(7).null_aware_eq(&Value::Int64(7)));
        assert!(Value::Float64(f64::NAN).null_aware_eq(&Value::Float64(f64::NAN)));
    }

    #[test]
    fn test_total_cmp_orders_nulls_first() {
        let mut values = vec![
            Value::Int32(3),
            Value::Null,
            Value::Int32(-1),
            Value::Text("b".into()),
            Value::Text("a".into()),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Int32(-1),
                Value::Int32(3),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_total_cmp_floats() {
        assert_eq!(
            Value::Float64(1.5).total_cmp(&Value::Float64(2.5)),
            Ordering::Less
        );
        assert_eq!(
            Value::Float64(f64::NAN).total_cmp(&Value::Float64(f64::NAN)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_type_accepts() {
        assert!(Type::Int4.accepts(&Value::Int32(1)));
        assert!(Type::Int4.accepts(&Value::Null));
        assert!(!Type::Int4.accepts(&Value::Int64(1)));
        assert!(Type::Varchar.accepts(&Value::Text("x".into())));
        assert!(!Type::Bytea.accepts(&Value::Text("x".into())));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Text("bob".into()).to_string(), "'bob'");
        assert_eq!(Value::Bytea(vec![0xde, 0xad]).to_string(), "\\xdead");
    }

    #[test]
    fn test_serialized_size() {
        assert_eq!(Value::Null.serialized_size(), 0);
        assert_eq!(Value::Int32(1).serialized_size(), 4);
        assert_eq!(Value::Text("abc".into()).serialized_size(), 7);
    }
}
