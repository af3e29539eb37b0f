//! Implicit conversions and their costs.
//!
//! Costs rank overload candidates and operand unification (lower is better):
//!
//! | conversion                         | cost  |
//! |------------------------------------|-------|
//! | identity                           | 0     |
//! | null to nullable, nullable wrap    | 1     |
//! | numeric widening                   | 2..=9 |
//! | enum to underlying integral        | 10    |
//! | user-defined (`convert_from`)      | 20    |
//! | anything to `Object`               | 50    |

use crate::types::{ClassRef, Type, Value};

pub const COST_IDENTITY: u32 = 0;
pub const COST_NULLABLE: u32 = 1;
pub const COST_WIDENING_BASE: u32 = 2;
pub const COST_ENUM_UNDERLYING: u32 = 10;
pub const COST_USER_DEFINED: u32 = 20;
pub const COST_OBJECT: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionKind {
    Identity,
    /// `null` literal to any type accepting null
    NullLiteral,
    /// `T` to `T?` (possibly widening the inner value first)
    NullableWrap,
    NumericWidening,
    EnumToUnderlying,
    /// Grouping viewed as its element sequence
    GroupingToSequence,
    /// Declared conversion on the target class, by index into its conversions
    UserDefined { class: ClassRef, index: usize },
    ToObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: ConversionKind,
    pub cost: u32,
}

impl Conversion {
    fn new(kind: ConversionKind, cost: u32) -> Self {
        Self { kind, cost }
    }

    pub fn is_identity(&self) -> bool {
        self.kind == ConversionKind::Identity
    }
}

/// Implicit numeric widening targets in order of preference
fn widening_targets(from: &Type) -> &'static [Type] {
    match from {
        Type::Int8 => &[Type::Int16, Type::Int32, Type::Int64, Type::Float32, Type::Float64],
        Type::UInt8 => &[
            Type::Int16,
            Type::UInt16,
            Type::Int32,
            Type::UInt32,
            Type::Int64,
            Type::UInt64,
            Type::Float32,
            Type::Float64,
        ],
        Type::Int16 => &[Type::Int32, Type::Int64, Type::Float32, Type::Float64],
        Type::UInt16 => &[
            Type::Int32,
            Type::UInt32,
            Type::Int64,
            Type::UInt64,
            Type::Float32,
            Type::Float64,
        ],
        Type::Int32 => &[Type::Int64, Type::Float32, Type::Float64],
        Type::UInt32 => &[Type::Int64, Type::UInt64, Type::Float32, Type::Float64],
        Type::Int64 | Type::UInt64 => &[Type::Float32, Type::Float64],
        Type::Float32 => &[Type::Float64],
        _ => &[],
    }
}

/// Cost of widening `from` into `to`, identity included
pub fn numeric_widening_cost(from: &Type, to: &Type) -> Option<u32> {
    if from == to && from.is_numeric() {
        return Some(COST_IDENTITY);
    }
    widening_targets(from)
        .iter()
        .position(|t| t == to)
        .map(|distance| COST_WIDENING_BASE + distance as u32)
}

/// Built-in implicit conversion from `from` to `to`, excluding user-defined ones
pub fn implicit_conversion(from: &Type, to: &Type) -> Option<Conversion> {
    if from == to {
        return Some(Conversion::new(ConversionKind::Identity, COST_IDENTITY));
    }
    if *from == Type::Null {
        return to
            .accepts_null()
            .then(|| Conversion::new(ConversionKind::NullLiteral, COST_NULLABLE));
    }

    match (from, to) {
        (Type::Nullable(inner_from), Type::Nullable(inner_to)) => {
            let inner = implicit_conversion(inner_from, inner_to)?;
            return matches!(
                inner.kind,
                ConversionKind::NumericWidening | ConversionKind::EnumToUnderlying
            )
            .then(|| Conversion::new(ConversionKind::NullableWrap, inner.cost + COST_NULLABLE));
        }
        (_, Type::Nullable(inner_to)) => {
            let inner = implicit_conversion(from, inner_to)?;
            return matches!(
                inner.kind,
                ConversionKind::Identity
                    | ConversionKind::NumericWidening
                    | ConversionKind::EnumToUnderlying
            )
            .then(|| Conversion::new(ConversionKind::NullableWrap, inner.cost + COST_NULLABLE));
        }
        (Type::Grouping(_, element), Type::Sequence(target)) if element == target => {
            return Some(Conversion::new(
                ConversionKind::GroupingToSequence,
                COST_NULLABLE,
            ));
        }
        (Type::Enum(def), target) if target.is_numeric() => {
            let widening = numeric_widening_cost(def.underlying(), target)?;
            return Some(Conversion::new(
                ConversionKind::EnumToUnderlying,
                COST_ENUM_UNDERLYING + widening,
            ));
        }
        _ => {}
    }

    if let Some(cost) = numeric_widening_cost(from, to) {
        return Some(Conversion::new(ConversionKind::NumericWidening, cost));
    }
    if *to == Type::Object {
        return Some(Conversion::new(ConversionKind::ToObject, COST_OBJECT));
    }
    None
}

/// Declared conversion from `from` into the class `to`
pub fn user_defined_conversion(from: &Type, to: &ClassRef) -> Option<Conversion> {
    to.conversions()
        .iter()
        .position(|c| &c.from == from)
        .map(|index| {
            Conversion::new(
                ConversionKind::UserDefined {
                    class: to.clone(),
                    index,
                },
                COST_USER_DEFINED,
            )
        })
}

/// Coerce a constant into `target` when its value (not just its type) allows it.
///
/// Covers string to Guid, string to enum (case-sensitive name, then numeric text),
/// integer to enum, integer to any numeric type the value fits, and null to
/// anything accepting null. Returns `None` when no coercion applies.
pub fn coerce_constant(value: &Value, target: &Type) -> Option<Value> {
    if value.is_null() {
        return target.accepts_null().then_some(Value::Null);
    }
    let target = target.non_nullable();
    match (value, target) {
        (Value::String(_), Type::String) => Some(value.clone()),
        (Value::String(s), Type::Guid) => value.cast(&Type::Guid).ok().filter(|_| !s.is_empty()),
        (Value::String(s), Type::Enum(def)) => def
            .variant_value(s)
            .or_else(|| s.trim().parse::<i64>().ok())
            .map(|v| Value::enumeration(def, v)),
        (Value::Enum(e), Type::Enum(def)) if &e.def == def => Some(value.clone()),
        (Value::Enum(_), _) => None,
        (_, Type::Enum(def)) => {
            let underlying = value.fit_numeric(def.underlying())?;
            underlying.as_i64().map(|v| Value::enumeration(def, v))
        }
        (_, t) if t.is_numeric() => value.fit_numeric(t),
        (Value::Boolean(_), Type::Boolean)
        | (Value::Guid(_), Type::Guid)
        | (Value::DateTime(_), Type::DateTime) => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassDef, EnumDef};

    #[test]
    fn test_identity_and_widening() {
        let conv = implicit_conversion(&Type::Int32, &Type::Int32).unwrap();
        assert!(conv.is_identity());

        let to_long = implicit_conversion(&Type::Int32, &Type::Int64).unwrap();
        let to_double = implicit_conversion(&Type::Int32, &Type::Float64).unwrap();
        assert_eq!(to_long.kind, ConversionKind::NumericWidening);
        assert!(to_long.cost < to_double.cost);

        assert!(implicit_conversion(&Type::Int64, &Type::Int32).is_none());
        assert!(implicit_conversion(&Type::Int32, &Type::UInt32).is_none());
        assert!(implicit_conversion(&Type::Float64, &Type::Float32).is_none());
    }

    #[test]
    fn test_nullable_conversions() {
        let nullable_int = Type::nullable(Type::Int32);
        let conv = implicit_conversion(&Type::Int32, &nullable_int).unwrap();
        assert_eq!(conv.kind, ConversionKind::NullableWrap);
        assert_eq!(conv.cost, COST_NULLABLE);

        let null = implicit_conversion(&Type::Null, &nullable_int).unwrap();
        assert_eq!(null.kind, ConversionKind::NullLiteral);
        assert!(implicit_conversion(&Type::Null, &Type::Int32).is_none());
        assert!(implicit_conversion(&nullable_int, &Type::Int32).is_none());

        let widened = implicit_conversion(&nullable_int, &Type::nullable(Type::Int64)).unwrap();
        assert_eq!(widened.kind, ConversionKind::NullableWrap);
    }

    #[test]
    fn test_enum_and_object_conversions() {
        let group = EnumDef::builder("UserGroup")
            .underlying(Type::UInt8)
            .variant("ADMIN", 0)
            .build();
        let conv = implicit_conversion(&group.ty(), &Type::Int32).unwrap();
        assert_eq!(conv.kind, ConversionKind::EnumToUnderlying);
        assert!(conv.cost >= COST_ENUM_UNDERLYING);
        assert!(implicit_conversion(&Type::Int32, &group.ty()).is_none());

        let obj = implicit_conversion(&Type::Guid, &Type::Object).unwrap();
        assert_eq!(obj.cost, COST_OBJECT);
    }

    #[test]
    fn test_grouping_views_as_sequence() {
        let grouping = Type::grouping(Type::String, Type::Int32);
        let conv = implicit_conversion(&grouping, &Type::sequence(Type::Int32)).unwrap();
        assert_eq!(conv.kind, ConversionKind::GroupingToSequence);
        assert!(implicit_conversion(&grouping, &Type::sequence(Type::Int64)).is_none());
    }

    #[test]
    fn test_user_defined_conversion() {
        let stamp = ClassDef::builder("Stamp")
            .field("Millis", Type::DateTime)
            .convert_from(Type::DateTime, |v| Ok(v.clone()))
            .build();
        let conv = user_defined_conversion(&Type::DateTime, &stamp).unwrap();
        assert_eq!(conv.cost, COST_USER_DEFINED);
        assert!(user_defined_conversion(&Type::Int32, &stamp).is_none());
    }

    #[test]
    fn test_coerce_constant() {
        let test_enum = EnumDef::builder("TestEnum")
            .variant("Var1", 0)
            .variant("Var5", 8)
            .build();
        let enum_ty = test_enum.ty();

        assert_eq!(
            coerce_constant(&Value::from("Var5"), &enum_ty),
            Some(test_enum.value("Var5"))
        );
        assert_eq!(
            coerce_constant(&Value::from("8"), &enum_ty),
            Some(test_enum.value("Var5"))
        );
        assert_eq!(coerce_constant(&Value::from("var5"), &enum_ty), None);
        assert_eq!(
            coerce_constant(&Value::Int32(8), &enum_ty),
            Some(test_enum.value("Var5"))
        );

        let guid = "0A191E77-E32D-4DE1-8F1C-A144C2B0424D";
        assert!(matches!(
            coerce_constant(&Value::from(guid), &Type::Guid),
            Some(Value::Guid(_))
        ));
        assert_eq!(coerce_constant(&Value::from("not a guid"), &Type::Guid), None);

        assert_eq!(coerce_constant(&Value::Int32(80), &Type::UInt8), Some(Value::UInt8(80)));
        assert_eq!(coerce_constant(&Value::Int32(-1), &Type::UInt8), None);
        assert_eq!(
            coerce_constant(&Value::Null, &Type::nullable(Type::Int32)),
            Some(Value::Null)
        );
        assert_eq!(coerce_constant(&Value::Null, &Type::Int32), None);
        assert_eq!(coerce_constant(&test_enum.value("Var1"), &Type::Int32), None);
    }
}
