//! Value-level operator semantics used by compiled closures.
//!
//! Operands arrive already converted to a common type by the binder; integer
//! arithmetic wraps like the host's unchecked context.

use crate::expression::operator::{BinaryOperator, UnaryOperator};
use crate::expression::{EvalError, EvalResult};
use crate::types::{Type, Value};
use std::cmp::Ordering;

fn mismatch(op: impl AsRef<str>, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: "operands of a common type".to_string(),
        actual: format!("{} and {}", left.type_name(), right.type_name()),
        context: format!("operator '{}'", op.as_ref()),
    }
}

macro_rules! integer_op {
    ($op:expr, $a:expr, $b:expr, $variant:path, $l:expr, $r:expr) => {{
        let (a, b) = ($a, $b);
        match $op {
            BinaryOperator::Add => $variant(a.wrapping_add(b)),
            BinaryOperator::Sub => $variant(a.wrapping_sub(b)),
            BinaryOperator::Mul => $variant(a.wrapping_mul(b)),
            BinaryOperator::Div if b == 0 => return Err(EvalError::DivisionByZero),
            BinaryOperator::Div => $variant(a.wrapping_div(b)),
            BinaryOperator::Rem if b == 0 => return Err(EvalError::DivisionByZero),
            BinaryOperator::Rem => $variant(a.wrapping_rem(b)),
            BinaryOperator::BitAnd => $variant(a & b),
            BinaryOperator::BitOr => $variant(a | b),
            BinaryOperator::BitXor => $variant(a ^ b),
            op => return Err(mismatch(op.as_str(), $l, $r)),
        }
    }};
}

macro_rules! float_op {
    ($op:expr, $a:expr, $b:expr, $variant:path, $l:expr, $r:expr) => {{
        let (a, b) = ($a, $b);
        match $op {
            BinaryOperator::Add => $variant(a + b),
            BinaryOperator::Sub => $variant(a - b),
            BinaryOperator::Mul => $variant(a * b),
            BinaryOperator::Div => $variant(a / b),
            BinaryOperator::Rem => $variant(a % b),
            op => return Err(mismatch(op.as_str(), $l, $r)),
        }
    }};
}

/// Arithmetic and bitwise operators; null operands propagate (lifted semantics)
pub fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let result = match (left, right) {
        (Value::Int32(a), Value::Int32(b)) => integer_op!(op, *a, *b, Value::Int32, left, right),
        (Value::Int64(a), Value::Int64(b)) => integer_op!(op, *a, *b, Value::Int64, left, right),
        (Value::UInt32(a), Value::UInt32(b)) => {
            integer_op!(op, *a, *b, Value::UInt32, left, right)
        }
        (Value::UInt64(a), Value::UInt64(b)) => {
            integer_op!(op, *a, *b, Value::UInt64, left, right)
        }
        (Value::Int8(a), Value::Int8(b)) => integer_op!(op, *a, *b, Value::Int8, left, right),
        (Value::Int16(a), Value::Int16(b)) => integer_op!(op, *a, *b, Value::Int16, left, right),
        (Value::UInt8(a), Value::UInt8(b)) => integer_op!(op, *a, *b, Value::UInt8, left, right),
        (Value::UInt16(a), Value::UInt16(b)) => {
            integer_op!(op, *a, *b, Value::UInt16, left, right)
        }
        (Value::Float32(a), Value::Float32(b)) => {
            float_op!(op, *a, *b, Value::Float32, left, right)
        }
        (Value::Float64(a), Value::Float64(b)) => {
            float_op!(op, *a, *b, Value::Float64, left, right)
        }
        (Value::Boolean(a), Value::Boolean(b)) => match op {
            BinaryOperator::BitAnd => Value::Boolean(*a & *b),
            BinaryOperator::BitOr => Value::Boolean(*a | *b),
            BinaryOperator::BitXor => Value::Boolean(*a ^ *b),
            op => return Err(mismatch(op.as_str(), left, right)),
        },
        (Value::Enum(a), Value::Enum(b)) if a.def == b.def && op.is_bitwise() => {
            let value = match op {
                BinaryOperator::BitAnd => a.value & b.value,
                BinaryOperator::BitOr => a.value | b.value,
                _ => a.value ^ b.value,
            };
            Value::enumeration(&a.def, value)
        }
        _ => return Err(mismatch(op.as_str(), left, right)),
    };
    Ok(result)
}

/// Shift with the count masked to the operand width
pub fn shift(op: BinaryOperator, left: &Value, count: &Value) -> EvalResult<Value> {
    if left.is_null() || count.is_null() {
        return Ok(Value::Null);
    }
    let n = count
        .as_i64()
        .ok_or_else(|| mismatch(op.as_str(), left, count))? as u32;
    let left_shift = op == BinaryOperator::Shl;
    let result = match left {
        Value::Int32(v) if left_shift => Value::Int32(v.wrapping_shl(n)),
        Value::Int32(v) => Value::Int32(v.wrapping_shr(n)),
        Value::Int64(v) if left_shift => Value::Int64(v.wrapping_shl(n)),
        Value::Int64(v) => Value::Int64(v.wrapping_shr(n)),
        Value::UInt32(v) if left_shift => Value::UInt32(v.wrapping_shl(n)),
        Value::UInt32(v) => Value::UInt32(v.wrapping_shr(n)),
        Value::UInt64(v) if left_shift => Value::UInt64(v.wrapping_shl(n)),
        Value::UInt64(v) => Value::UInt64(v.wrapping_shr(n)),
        _ => return Err(mismatch(op.as_str(), left, count)),
    };
    Ok(result)
}

/// Comparison operators; relational operators with a null operand are false
pub fn compare(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let result = match op {
        BinaryOperator::Eq => left.equals(right),
        BinaryOperator::Ne => !left.equals(right),
        _ if left.is_null() || right.is_null() => false,
        _ => left
            .compare(right)
            .map(|ordering| op.accepts(ordering))
            .unwrap_or(false),
    };
    Ok(Value::Boolean(result))
}

/// Apply a declared comparison, honoring null operands and declaration order
pub fn custom_compare(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    ordering: impl FnOnce(&Value, &Value) -> EvalResult<Option<Ordering>>,
    reversed: bool,
) -> EvalResult<Value> {
    if left.is_null() || right.is_null() {
        let both = left.is_null() && right.is_null();
        let result = match op {
            BinaryOperator::Eq => both,
            BinaryOperator::Ne => !both,
            _ => false,
        };
        return Ok(Value::Boolean(result));
    }
    let ordering = if reversed {
        ordering(right, left)?.map(Ordering::reverse)
    } else {
        ordering(left, right)?
    };
    Ok(Value::Boolean(
        ordering.map(|o| op.accepts(o)).unwrap_or(false),
    ))
}

pub fn concat(left: &Value, right: &Value) -> Value {
    Value::String(format!("{}{}", left, right))
}

pub fn unary(op: UnaryOperator, operand: &Value) -> EvalResult<Value> {
    let result = match (op, operand) {
        (_, Value::Null) => Value::Null,
        (UnaryOperator::Not, Value::Boolean(b)) => Value::Boolean(!b),
        (UnaryOperator::Not, Value::Int32(v)) => Value::Int32(!v),
        (UnaryOperator::Not, Value::Int64(v)) => Value::Int64(!v),
        (UnaryOperator::Not, Value::UInt32(v)) => Value::UInt32(!v),
        (UnaryOperator::Not, Value::UInt64(v)) => Value::UInt64(!v),
        (UnaryOperator::Negate, Value::Int32(v)) => Value::Int32(v.wrapping_neg()),
        (UnaryOperator::Negate, Value::Int64(v)) => Value::Int64(v.wrapping_neg()),
        (UnaryOperator::Negate, Value::Float32(v)) => Value::Float32(-v),
        (UnaryOperator::Negate, Value::Float64(v)) => Value::Float64(-v),
        (op, value) => {
            return Err(EvalError::TypeMismatch {
                expected: "numeric or boolean operand".to_string(),
                actual: value.type_name(),
                context: format!("operator '{}'", op.as_str()),
            })
        }
    };
    Ok(result)
}

/// Sequence operators over materialized items
pub mod sequence {
    use super::*;

    /// Element callback used for lambda arguments
    pub type Selector<'a> = dyn Fn(&Value) -> EvalResult<Value> + 'a;

    fn truthy(value: Value) -> EvalResult<bool> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(EvalError::TypeMismatch {
                expected: "Boolean".to_string(),
                actual: other.type_name(),
                context: "predicate".to_string(),
            }),
        }
    }

    pub fn any(items: &[Value], predicate: Option<&Selector<'_>>) -> EvalResult<Value> {
        let Some(predicate) = predicate else {
            return Ok(Value::Boolean(!items.is_empty()));
        };
        for item in items {
            if truthy(predicate(item)?)? {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }

    pub fn all(items: &[Value], predicate: &Selector<'_>) -> EvalResult<Value> {
        for item in items {
            if !truthy(predicate(item)?)? {
                return Ok(Value::Boolean(false));
            }
        }
        Ok(Value::Boolean(true))
    }

    pub fn count(items: &[Value], predicate: Option<&Selector<'_>>) -> EvalResult<Value> {
        let Some(predicate) = predicate else {
            return Ok(Value::Int32(items.len() as i32));
        };
        let mut n = 0;
        for item in items {
            if truthy(predicate(item)?)? {
                n += 1;
            }
        }
        Ok(Value::Int32(n))
    }

    pub fn contains(items: &[Value], needle: &Value) -> Value {
        Value::Boolean(items.iter().any(|item| item.equals(needle)))
    }

    fn project(items: &[Value], selector: Option<&Selector<'_>>) -> EvalResult<Vec<Value>> {
        match selector {
            Some(selector) => items.iter().map(selector).collect(),
            None => Ok(items.to_vec()),
        }
    }

    /// Sum of non-null values; zero for an empty input
    pub fn sum(items: &[Value], selector: Option<&Selector<'_>>, ty: &Type) -> EvalResult<Value> {
        let zero = ty.non_nullable().default_value();
        project(items, selector)?
            .iter()
            .filter(|v| !v.is_null())
            .try_fold(zero, |acc, v| arithmetic(BinaryOperator::Add, &acc, v))
    }

    /// Min or Max over non-null values; empty input is null for nullable results
    pub fn extreme(
        items: &[Value],
        selector: Option<&Selector<'_>>,
        ty: &Type,
        want: Ordering,
    ) -> EvalResult<Value> {
        let mut best: Option<Value> = None;
        for value in project(items, selector)? {
            if value.is_null() {
                continue;
            }
            best = match best {
                Some(current) if value.compare(&current) != Some(want) => Some(current),
                _ => Some(value),
            };
        }
        match best {
            Some(value) => Ok(value),
            None if ty.accepts_null() => Ok(Value::Null),
            None => Err(EvalError::EmptySequence),
        }
    }

    /// Average as `Double` (or `Single` for single-precision input)
    pub fn average(
        items: &[Value],
        selector: Option<&Selector<'_>>,
        ty: &Type,
    ) -> EvalResult<Value> {
        let values: Vec<f64> = project(items, selector)?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        if values.is_empty() {
            return if ty.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(EvalError::EmptySequence)
            };
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Value::Float64(mean).cast(ty.non_nullable())
    }

    /// First or last matching element; `default` replaces the empty-sequence error
    pub fn pick(
        items: &[Value],
        predicate: Option<&Selector<'_>>,
        last: bool,
        default: Option<Value>,
    ) -> EvalResult<Value> {
        let mut found = None;
        let ordered: Box<dyn Iterator<Item = &Value> + '_> = if last {
            Box::new(items.iter().rev())
        } else {
            Box::new(items.iter())
        };
        for item in ordered {
            let matched = match predicate {
                Some(predicate) => truthy(predicate(item)?)?,
                None => true,
            };
            if matched {
                found = Some(item.clone());
                break;
            }
        }
        found.or(default).ok_or(EvalError::EmptySequence)
    }

    pub fn filter(items: &[Value], predicate: &Selector<'_>) -> EvalResult<Value> {
        let mut out = Vec::new();
        for item in items {
            if truthy(predicate(item)?)? {
                out.push(item.clone());
            }
        }
        Ok(Value::sequence(out))
    }

    pub fn select(items: &[Value], selector: &Selector<'_>) -> EvalResult<Value> {
        project(items, Some(selector)).map(Value::sequence)
    }

    /// Stable sort by key
    pub fn order_by(items: &[Value], key: &Selector<'_>, descending: bool) -> EvalResult<Value> {
        let mut keyed = items
            .iter()
            .map(|item| Ok((key(item)?, item.clone())))
            .collect::<EvalResult<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(Value::sequence(keyed.into_iter().map(|(_, v)| v).collect()))
    }

    pub fn distinct(items: &[Value]) -> Value {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.iter().any(|seen| seen.equals(item)) {
                out.push(item.clone());
            }
        }
        Value::sequence(out)
    }

    pub fn take(items: &[Value], n: i64) -> Value {
        let n = n.clamp(0, items.len() as i64) as usize;
        Value::sequence(items[..n].to_vec())
    }

    pub fn skip(items: &[Value], n: i64) -> Value {
        let n = n.clamp(0, items.len() as i64) as usize;
        Value::sequence(items[n..].to_vec())
    }
}
