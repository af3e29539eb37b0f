use crate::expression::{EvalError, EvalResult};
use crate::types::{ClassRef, EnumRef, Equality, Type};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Runtime values flowing through compiled expressions
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Guid(Uuid),
    /// Milliseconds since the Unix epoch, UTC
    DateTime(i64),
    Enum(EnumValue),
    Object(Arc<ObjectValue>),
    Sequence(Arc<Vec<Value>>),
    Grouping(Arc<Grouping>),
}

/// Enum constant; the value is stored widened, the definition fixes its width
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub def: EnumRef,
    pub value: i64,
}

/// Class instance with positional field values
#[derive(Debug)]
pub struct ObjectValue {
    pub class: ClassRef,
    pub fields: Vec<Value>,
}

impl ObjectValue {
    /// Field by declared name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.class
            .field_index(name)
            .and_then(|index| self.fields.get(index))
    }
}

/// Result element of a grouping: key plus the grouped elements
#[derive(Debug)]
pub struct Grouping {
    pub key: Value,
    pub items: Vec<Value>,
}

/// Numeric view used for conversions
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn as_i128(self) -> i128 {
        match self {
            Numeric::Int(v) => v,
            Numeric::Float(v) => v as i128,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }
}

impl Value {
    pub fn object(class: &ClassRef, fields: Vec<Value>) -> Value {
        debug_assert_eq!(
            class.fields().len(),
            fields.len(),
            "field count mismatch for {}",
            class.name()
        );
        Value::Object(Arc::new(ObjectValue {
            class: class.clone(),
            fields,
        }))
    }

    pub fn sequence(items: Vec<Value>) -> Value {
        Value::Sequence(Arc::new(items))
    }

    pub fn grouping(key: Value, items: Vec<Value>) -> Value {
        Value::Grouping(Arc::new(Grouping { key, items }))
    }

    pub fn enumeration(def: &EnumRef, value: i64) -> Value {
        Value::Enum(EnumValue {
            def: def.clone(),
            value,
        })
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Integral value widened to `i64` (enums yield their underlying value)
    pub fn as_i64(&self) -> Option<i64> {
        match self.numeric()? {
            Numeric::Int(v) => i64::try_from(v).ok(),
            Numeric::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.numeric().map(Numeric::as_f64)
    }

    /// Elements of a sequence or grouping
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            Value::Grouping(group) => Some(&group.items),
            _ => None,
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        let n = match self {
            Value::Int8(v) => Numeric::Int(*v as i128),
            Value::Int16(v) => Numeric::Int(*v as i128),
            Value::Int32(v) => Numeric::Int(*v as i128),
            Value::Int64(v) => Numeric::Int(*v as i128),
            Value::UInt8(v) => Numeric::Int(*v as i128),
            Value::UInt16(v) => Numeric::Int(*v as i128),
            Value::UInt32(v) => Numeric::Int(*v as i128),
            Value::UInt64(v) => Numeric::Int(*v as i128),
            Value::Enum(e) => Numeric::Int(e.value as i128),
            Value::Float32(v) => Numeric::Float(*v as f64),
            Value::Float64(v) => Numeric::Float(*v),
            _ => return None,
        };
        Some(n)
    }

    /// Unchecked numeric conversion with host cast semantics (truncation, wrapping)
    pub fn cast_numeric(&self, target: &Type) -> Option<Value> {
        let n = self.numeric()?;
        let value = match target {
            Type::Int8 => Value::Int8(n.as_i128() as i8),
            Type::Int16 => Value::Int16(n.as_i128() as i16),
            Type::Int32 => Value::Int32(n.as_i128() as i32),
            Type::Int64 => Value::Int64(n.as_i128() as i64),
            Type::UInt8 => Value::UInt8(n.as_i128() as u8),
            Type::UInt16 => Value::UInt16(n.as_i128() as u16),
            Type::UInt32 => Value::UInt32(n.as_i128() as u32),
            Type::UInt64 => Value::UInt64(n.as_i128() as u64),
            Type::Float32 => Value::Float32(n.as_f64() as f32),
            Type::Float64 => Value::Float64(n.as_f64()),
            Type::Enum(def) => Value::enumeration(def, n.as_i128() as i64),
            _ => return None,
        };
        Some(value)
    }

    /// Checked numeric conversion: `None` when the value does not fit exactly
    pub fn fit_numeric(&self, target: &Type) -> Option<Value> {
        let n = self.numeric()?;
        match (n, target) {
            (Numeric::Int(v), t) if t.is_integral() => {
                let (min, max): (i128, i128) = match t {
                    Type::Int8 => (i8::MIN as i128, i8::MAX as i128),
                    Type::Int16 => (i16::MIN as i128, i16::MAX as i128),
                    Type::Int32 => (i32::MIN as i128, i32::MAX as i128),
                    Type::Int64 => (i64::MIN as i128, i64::MAX as i128),
                    Type::UInt8 => (0, u8::MAX as i128),
                    Type::UInt16 => (0, u16::MAX as i128),
                    Type::UInt32 => (0, u32::MAX as i128),
                    _ => (0, u64::MAX as i128),
                };
                if v < min || v > max {
                    return None;
                }
                self.cast_numeric(target)
            }
            (Numeric::Int(_), Type::Float32 | Type::Float64) => self.cast_numeric(target),
            (Numeric::Float(_), Type::Float64) => self.cast_numeric(target),
            (Numeric::Float(v), Type::Float32) if (v as f32) as f64 == v || v.is_nan() => {
                self.cast_numeric(target)
            }
            _ => None,
        }
    }

    /// Explicit conversion used by `Type(expr)` calls and bound `Convert` nodes
    pub fn cast(&self, target: &Type) -> EvalResult<Value> {
        if self.is_null() {
            return if target.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(EvalError::null_reference(format!("conversion to {}", target)))
            };
        }
        let target = target.non_nullable();
        match (self, target) {
            (_, Type::Object) => Ok(self.clone()),
            (Value::String(s), Type::String) => Ok(Value::String(s.clone())),
            (_, Type::String) => Ok(Value::String(self.to_string())),
            (Value::String(s), Type::Guid) => {
                Uuid::parse_str(s.trim_matches(|c| c == '{' || c == '}'))
                    .map(Value::Guid)
                    .map_err(|_| EvalError::InvalidFormat {
                        value: s.clone(),
                        target: target.to_string(),
                    })
            }
            (Value::String(s), Type::Enum(def)) => def
                .variant_value(s)
                .or_else(|| s.trim().parse::<i64>().ok())
                .map(|v| Value::enumeration(def, v))
                .ok_or_else(|| EvalError::InvalidFormat {
                    value: s.clone(),
                    target: target.to_string(),
                }),
            (Value::String(s), t) if t.is_numeric() => parse_numeric(s, t),
            (Value::Boolean(b), Type::Boolean) => Ok(Value::Boolean(*b)),
            (Value::Guid(g), Type::Guid) => Ok(Value::Guid(*g)),
            (Value::DateTime(ms), Type::DateTime) => Ok(Value::DateTime(*ms)),
            (Value::Enum(e), Type::Enum(def)) if &e.def == def => Ok(self.clone()),
            (Value::Object(obj), Type::Class(class)) if &obj.class == class => Ok(self.clone()),
            (Value::Sequence(_) | Value::Grouping(_), Type::Sequence(_)) => Ok(self.clone()),
            (Value::Grouping(_), Type::Grouping(_, _)) => Ok(self.clone()),
            _ => self.cast_numeric(target).ok_or_else(|| EvalError::InvalidCast {
                from: self.type_name(),
                target: target.to_string(),
            }),
        }
    }

    /// Equality used by `=`/`!=` after operand unification; null equals only null
    pub fn equals(&self, other: &Value) -> bool {
        self == other
    }

    /// Ordering used by relational operators and sorting; null sorts lowest
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) => Some(a.value.cmp(&b.value)),
            _ => match (self.numeric()?, other.numeric()?) {
                (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
                (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
            },
        }
    }

    /// Name of the runtime shape, used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(_) => "Boolean".to_string(),
            Value::Int8(_) => "SByte".to_string(),
            Value::Int16(_) => "Int16".to_string(),
            Value::Int32(_) => "Int32".to_string(),
            Value::Int64(_) => "Int64".to_string(),
            Value::UInt8(_) => "Byte".to_string(),
            Value::UInt16(_) => "UInt16".to_string(),
            Value::UInt32(_) => "UInt32".to_string(),
            Value::UInt64(_) => "UInt64".to_string(),
            Value::Float32(_) => "Single".to_string(),
            Value::Float64(_) => "Double".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Guid(_) => "Guid".to_string(),
            Value::DateTime(_) => "DateTime".to_string(),
            Value::Enum(e) => e.def.name().to_string(),
            Value::Object(obj) => obj.class.name().to_string(),
            Value::Sequence(_) => "IEnumerable".to_string(),
            Value::Grouping(_) => "IGrouping".to_string(),
        }
    }

    /// Best static type for a runtime value; used for parameter values
    pub fn static_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Int8(_) => Type::Int8,
            Value::Int16(_) => Type::Int16,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::UInt8(_) => Type::UInt8,
            Value::UInt16(_) => Type::UInt16,
            Value::UInt32(_) => Type::UInt32,
            Value::UInt64(_) => Type::UInt64,
            Value::Float32(_) => Type::Float32,
            Value::Float64(_) => Type::Float64,
            Value::String(_) => Type::String,
            Value::Guid(_) => Type::Guid,
            Value::DateTime(_) => Type::DateTime,
            Value::Enum(e) => e.def.ty(),
            Value::Object(obj) => obj.class.ty(),
            Value::Sequence(items) => Type::sequence(element_type_of(items)),
            Value::Grouping(group) => {
                Type::grouping(group.key.static_type(), element_type_of(&group.items))
            }
        }
    }
}

fn element_type_of(items: &[Value]) -> Type {
    items
        .iter()
        .find(|v| !v.is_null())
        .map(Value::static_type)
        .unwrap_or(Type::Object)
}

fn parse_numeric(s: &str, target: &Type) -> EvalResult<Value> {
    let text = s.trim();
    let invalid = || EvalError::InvalidFormat {
        value: s.to_string(),
        target: target.to_string(),
    };
    let parsed = if target.is_integral() {
        let v = text.parse::<i128>().map_err(|_| invalid())?;
        i64::try_from(v)
            .ok()
            .map(Value::Int64)
            .or_else(|| u64::try_from(v).ok().map(Value::UInt64))
    } else {
        text.parse::<f64>().ok().map(Value::Float64)
    };
    parsed
        .and_then(|v| v.fit_numeric(target))
        .ok_or_else(invalid)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::UInt8(a), Value::UInt8(b)) => a == b,
            (Value::UInt16(a), Value::UInt16(b)) => a == b,
            (Value::UInt32(a), Value::UInt32(b)) => a == b,
            (Value::UInt64(a), Value::UInt64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a.def == b.def && a.value == b.value,
            (Value::Object(a), Value::Object(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.class == b.class
                        && a.class.equality() == Equality::Structural
                        && a.fields == b.fields)
            }
            (Value::Sequence(a), Value::Sequence(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Grouping(a), Value::Grouping(b)) => {
                Arc::ptr_eq(a, b) || (a.key == b.key && a.items == b.items)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Guid(g) => write!(f, "{}", g.hyphenated()),
            Value::DateTime(ms) => write!(f, "{}", ms),
            Value::Enum(e) => match e.def.variant_name(e.value) {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "{}", e.value),
            },
            Value::Object(obj) => {
                write!(f, "{{ ")?;
                for (i, (field, value)) in obj.class.fields().iter().zip(&obj.fields).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", field.name, value)?;
                }
                write!(f, " }}")
            }
            Value::Sequence(_) | Value::Grouping(_) => write!(f, "{}", self.static_type()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::sequence(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassDef, EnumDef};

    #[test]
    fn test_static_type() {
        assert_eq!(Value::Int32(1).static_type(), Type::Int32);
        assert_eq!(Value::Null.static_type(), Type::Null);
        assert_eq!(
            Value::from(vec![Uuid::nil()]).static_type(),
            Type::sequence(Type::Guid)
        );
        assert_eq!(
            Value::sequence(vec![]).static_type(),
            Type::sequence(Type::Object)
        );
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(Value::Int32(300).cast_numeric(&Type::UInt8), Some(Value::UInt8(44)));
        assert_eq!(Value::Float64(2.9).cast_numeric(&Type::Int32), Some(Value::Int32(2)));
        assert_eq!(Value::Int32(300).fit_numeric(&Type::UInt8), None);
        assert_eq!(Value::Int32(200).fit_numeric(&Type::UInt8), Some(Value::UInt8(200)));
        assert_eq!(Value::Int32(-1).fit_numeric(&Type::UInt64), None);
        assert_eq!(Value::Int32(3).fit_numeric(&Type::Float64), Some(Value::Float64(3.0)));
        assert_eq!(Value::Float64(1.5).fit_numeric(&Type::Int32), None);
    }

    #[test]
    fn test_cast_from_string() {
        let guid = "0a191e77-e32d-4de1-8f1c-a144c2b0424d";
        assert_eq!(
            Value::from(guid).cast(&Type::Guid),
            Ok(Value::Guid(Uuid::parse_str(guid).unwrap()))
        );
        assert!(matches!(
            Value::from("nope").cast(&Type::Guid),
            Err(EvalError::InvalidFormat { .. })
        ));
        assert_eq!(Value::from("42").cast(&Type::Int32), Ok(Value::Int32(42)));
        assert_eq!(Value::Int32(42).cast(&Type::String), Ok(Value::from("42")));
        assert!(Value::Null.cast(&Type::Int32).is_err());
        assert_eq!(Value::Null.cast(&Type::nullable(Type::Int32)), Ok(Value::Null));
    }

    #[test]
    fn test_enum_values() {
        let color = EnumDef::builder("Color")
            .variant("Red", 1)
            .variant("Green", 2)
            .build();
        let red = color.value("Red");
        assert_eq!(red, Value::enumeration(&color, 1));
        assert_eq!(red.to_string(), "Red");
        assert_eq!(Value::from("Green").cast(&color.ty()), Ok(color.value("Green")));
        assert_eq!(Value::from("2").cast(&color.ty()), Ok(color.value("Green")));
        assert_eq!(red.as_i64(), Some(1));
    }

    #[test]
    fn test_object_equality() {
        let point = ClassDef::builder("Point")
            .field("X", Type::Int32)
            .structural_equality()
            .build();
        let node = ClassDef::builder("Node").field("X", Type::Int32).build();

        let a = Value::object(&point, vec![Value::Int32(1)]);
        let b = Value::object(&point, vec![Value::Int32(1)]);
        assert_eq!(a, b);

        let c = Value::object(&node, vec![Value::Int32(1)]);
        let d = Value::object(&node, vec![Value::Int32(1)]);
        assert_ne!(c, d);
        assert_eq!(c, c.clone());
        assert_eq!(c.as_object().and_then(|o| o.get("X")), Some(&Value::Int32(1)));
    }

    #[test]
    fn test_compare_orders_null_first() {
        assert_eq!(Value::Null.compare(&Value::Int32(0)), Some(Ordering::Less));
        assert_eq!(Value::Int32(3).compare(&Value::Int64(2)), Some(Ordering::Greater));
        assert_eq!(
            Value::from("a").compare(&Value::from("b")),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Float64(f64::NAN).compare(&Value::Float64(1.0)), None);
    }
}
