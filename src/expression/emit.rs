//! Translation of bound trees into executable closures.
//!
//! Emission is a single structural walk; every type decision was made by the
//! binder, so nothing here can fail. Failures surface only when a closure runs.

use crate::expression::expr::{Expr, ExprKind, PlaceholderValue, UserConversion};
use crate::expression::operator::{BinaryOperator, SequenceMethod};
use crate::expression::runtime::{self, sequence, sequence::Selector};
use crate::expression::{EvalError, EvalResult};
use crate::types::{MemberKind, Type, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Executable form of a bound expression
pub type Eval = Arc<dyn Fn(&Env<'_>) -> EvalResult<Value> + Send + Sync>;

/// Evaluation environment: one element per enclosing lambda, root first
pub struct Env<'a> {
    frames: Vec<&'a Value>,
}

impl<'a> Env<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { frames: vec![root] }
    }

    /// Environment for a nested lambda invoked with `item`
    pub fn child<'b>(&'b self, item: &'b Value) -> Env<'b>
    where
        'a: 'b,
    {
        let mut frames: Vec<&'b Value> = self.frames.clone();
        frames.push(item);
        Env { frames }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, depth: usize) -> EvalResult<&'a Value> {
        self.frames
            .get(depth)
            .copied()
            .ok_or_else(|| EvalError::evaluation(format!("no scope frame at depth {}", depth)))
    }
}

/// Evaluate a bound expression once against `element`
pub fn evaluate(expr: &Expr, element: &Value) -> EvalResult<Value> {
    emit(expr)(&Env::new(element))
}

fn constant(value: Value) -> Eval {
    Arc::new(move |_| Ok(value.clone()))
}

/// Emit a closure for `expr`
pub fn emit(expr: &Expr) -> Eval {
    match &expr.kind {
        ExprKind::Literal(value) => constant(value.clone()),

        ExprKind::Parameter { depth } => {
            let depth = *depth;
            Arc::new(move |env| env.frame(depth).cloned())
        }

        ExprKind::Placeholder { value, .. } => match value {
            PlaceholderValue::Constant(value) => constant(value.clone()),
            PlaceholderValue::Deferred(source) => {
                let source = source.clone();
                Arc::new(move |_| source())
            }
        },

        ExprKind::Member { target, member } => {
            let target_ty = target.ty.clone();
            let target = emit(target);
            let name = member.name.clone();
            match member.kind.clone() {
                MemberKind::Field(index) => Arc::new(move |env| match target(env)? {
                    Value::Object(obj) => obj.fields.get(index).cloned().ok_or_else(|| {
                        EvalError::evaluation(format!("field '{}' missing on {}", name, obj.class.name()))
                    }),
                    Value::Null => Err(EvalError::null_reference(format!("member '{}'", name))),
                    other => Err(EvalError::TypeMismatch {
                        expected: target_ty.to_string(),
                        actual: other.type_name(),
                        context: format!("member '{}'", name),
                    }),
                }),
                MemberKind::Property(getter) => {
                    let tolerates_null = target_ty.is_nullable();
                    Arc::new(move |env| {
                        let this = target(env)?;
                        if this.is_null() && !tolerates_null {
                            return Err(EvalError::null_reference(format!("member '{}'", name)));
                        }
                        getter(&this)
                    })
                }
                MemberKind::Constant(value) => constant(value),
            }
        }

        ExprKind::Call {
            target,
            method,
            args,
        } => {
            let tolerates_null = target.ty.is_nullable();
            let target = emit(target);
            let args: Vec<Eval> = args.iter().map(emit).collect();
            let method = method.clone();
            Arc::new(move |env| {
                let this = target(env)?;
                if this.is_null() && !tolerates_null {
                    return Err(EvalError::null_reference(format!(
                        "call to '{}'",
                        method.name
                    )));
                }
                let values = args
                    .iter()
                    .map(|arg| arg(env))
                    .collect::<EvalResult<Vec<_>>>()?;
                (method.func)(&this, &values)
            })
        }

        ExprKind::SequenceCall {
            target,
            method,
            lambda,
            arg,
        } => emit_sequence_call(
            emit(target),
            *method,
            lambda.as_deref().map(emit),
            arg.as_deref().map(emit),
            expr.ty.clone(),
        ),

        ExprKind::Binary { op, left, right } => emit_binary(*op, emit(left), emit(right)),

        ExprKind::Unary { op, operand } => {
            let op = *op;
            let operand = emit(operand);
            Arc::new(move |env| runtime::unary(op, &operand(env)?))
        }

        ExprKind::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let test = emit(test);
            let if_true = emit(if_true);
            let if_false = emit(if_false);
            Arc::new(move |env| match test(env)? {
                Value::Boolean(true) => if_true(env),
                _ => if_false(env),
            })
        }

        ExprKind::Index { target, index } => {
            let target = emit(target);
            let index = emit(index);
            Arc::new(move |env| {
                let container = target(env)?;
                let position = index(env)?.as_i64().unwrap_or(-1);
                match &container {
                    Value::Null => Err(EvalError::null_reference("indexer")),
                    Value::String(s) => usize::try_from(position)
                        .ok()
                        .and_then(|p| s.chars().nth(p))
                        .map(|c| Value::String(c.to_string()))
                        .ok_or(EvalError::IndexOutOfRange {
                            index: position,
                            len: s.chars().count(),
                        }),
                    other => {
                        let items = other.items().unwrap_or_default();
                        usize::try_from(position)
                            .ok()
                            .and_then(|p| items.get(p))
                            .cloned()
                            .ok_or(EvalError::IndexOutOfRange {
                                index: position,
                                len: items.len(),
                            })
                    }
                }
            })
        }

        ExprKind::Convert { operand, user } => {
            let operand = emit(operand);
            let target = expr.ty.clone();
            match user {
                Some(user) => emit_user_conversion(operand, user, target),
                None => Arc::new(move |env| operand(env)?.cast(&target)),
            }
        }

        ExprKind::CustomCompare {
            op,
            left,
            right,
            comparison,
        } => {
            let op = *op;
            let left = emit(left);
            let right = emit(right);
            let comparison = comparison.clone();
            Arc::new(move |env| {
                let l = left(env)?;
                let r = right(env)?;
                runtime::custom_compare(
                    op,
                    &l,
                    &r,
                    |a, b| (comparison.compare)(a, b),
                    comparison.reversed,
                )
            })
        }

        ExprKind::New { class, fields } => {
            let class = class.clone();
            let fields: Vec<Eval> = fields.iter().map(emit).collect();
            Arc::new(move |env| {
                let values = fields
                    .iter()
                    .map(|field| field(env))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::object(&class, values))
            })
        }
    }
}

fn emit_binary(op: BinaryOperator, left: Eval, right: Eval) -> Eval {
    match op {
        BinaryOperator::AndAlso => Arc::new(move |env| match left(env)? {
            Value::Boolean(false) => Ok(Value::Boolean(false)),
            _ => right(env),
        }),
        BinaryOperator::OrElse => Arc::new(move |env| match left(env)? {
            Value::Boolean(true) => Ok(Value::Boolean(true)),
            _ => right(env),
        }),
        op if op.is_comparison() => {
            Arc::new(move |env| runtime::compare(op, &left(env)?, &right(env)?))
        }
        op if op.is_shift() => Arc::new(move |env| runtime::shift(op, &left(env)?, &right(env)?)),
        BinaryOperator::Concat => {
            Arc::new(move |env| Ok(runtime::concat(&left(env)?, &right(env)?)))
        }
        op => Arc::new(move |env| runtime::arithmetic(op, &left(env)?, &right(env)?)),
    }
}

fn emit_user_conversion(operand: Eval, user: &UserConversion, target: Type) -> Eval {
    let Some(def) = user.class.conversions().get(user.index).cloned() else {
        let from = user.class.name().to_string();
        return Arc::new(move |_| {
            Err(EvalError::InvalidCast {
                from: from.clone(),
                target: target.to_string(),
            })
        });
    };
    Arc::new(move |env| {
        let value = operand(env)?;
        if value.is_null() {
            Ok(Value::Null)
        } else {
            (def.convert)(&value)
        }
    })
}

fn emit_sequence_call(
    target: Eval,
    method: SequenceMethod,
    lambda: Option<Eval>,
    arg: Option<Eval>,
    ty: Type,
) -> Eval {
    Arc::new(move |env| {
        let source = target(env)?;
        let items = match &source {
            Value::Null => {
                return Err(EvalError::null_reference(format!(
                    "call to '{}'",
                    method.as_str()
                )))
            }
            other => other.items().ok_or_else(|| EvalError::TypeMismatch {
                expected: "sequence".to_string(),
                actual: other.type_name(),
                context: format!("call to '{}'", method.as_str()),
            })?,
        };

        let apply = |item: &Value| -> EvalResult<Value> {
            match &lambda {
                Some(body) => body(&env.child(item)),
                None => Ok(item.clone()),
            }
        };
        let selector: Option<&Selector<'_>> = lambda.is_some().then_some(&apply as &Selector<'_>);
        let argument = || -> EvalResult<Value> {
            match &arg {
                Some(arg) => arg(env),
                None => Ok(Value::Null),
            }
        };

        match method {
            SequenceMethod::Any => sequence::any(items, selector),
            SequenceMethod::All => sequence::all(items, &apply),
            SequenceMethod::Count => sequence::count(items, selector),
            SequenceMethod::Contains => Ok(sequence::contains(items, &argument()?)),
            SequenceMethod::Sum => sequence::sum(items, selector, &ty),
            SequenceMethod::Min => sequence::extreme(items, selector, &ty, Ordering::Less),
            SequenceMethod::Max => sequence::extreme(items, selector, &ty, Ordering::Greater),
            SequenceMethod::Average => sequence::average(items, selector, &ty),
            SequenceMethod::First => sequence::pick(items, selector, false, None),
            SequenceMethod::Last => sequence::pick(items, selector, true, None),
            SequenceMethod::FirstOrDefault => {
                sequence::pick(items, selector, false, Some(ty.default_value()))
            }
            SequenceMethod::LastOrDefault => {
                sequence::pick(items, selector, true, Some(ty.default_value()))
            }
            SequenceMethod::Where => sequence::filter(items, &apply),
            SequenceMethod::Select => sequence::select(items, &apply),
            SequenceMethod::OrderBy => sequence::order_by(items, &apply, false),
            SequenceMethod::OrderByDescending => sequence::order_by(items, &apply, true),
            SequenceMethod::Distinct => Ok(sequence::distinct(items)),
            SequenceMethod::Take => Ok(sequence::take(items, argument()?.as_i64().unwrap_or(0))),
            SequenceMethod::Skip => Ok(sequence::skip(items, argument()?.as_i64().unwrap_or(0))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::operator::UnaryOperator;
    use crate::types::{ClassDef, Member};

    fn int_param() -> Expr {
        Expr::parameter(0, Type::Int32)
    }

    #[test]
    fn test_literal_and_parameter() {
        assert_eq!(
            evaluate(&Expr::literal(Value::Int32(7)), &Value::Null),
            Ok(Value::Int32(7))
        );
        assert_eq!(evaluate(&int_param(), &Value::Int32(3)), Ok(Value::Int32(3)));
    }

    #[test]
    fn test_binary_and_short_circuit() {
        let shifted = Expr::binary(
            BinaryOperator::Shl,
            int_param(),
            Expr::literal(Value::Int32(2)),
            Type::Int32,
        );
        let test = Expr::binary(
            BinaryOperator::Eq,
            shifted,
            Expr::literal(Value::Int32(80)),
            Type::Boolean,
        );
        assert_eq!(evaluate(&test, &Value::Int32(20)), Ok(Value::Boolean(true)));
        assert_eq!(evaluate(&test, &Value::Int32(10)), Ok(Value::Boolean(false)));

        // right side would divide by zero if evaluated
        let failing = Expr::binary(
            BinaryOperator::Eq,
            Expr::binary(
                BinaryOperator::Div,
                int_param(),
                Expr::literal(Value::Int32(0)),
                Type::Int32,
            ),
            Expr::literal(Value::Int32(1)),
            Type::Boolean,
        );
        let guarded = Expr::binary(
            BinaryOperator::AndAlso,
            Expr::literal(Value::Boolean(false)),
            failing.clone(),
            Type::Boolean,
        );
        assert_eq!(evaluate(&guarded, &Value::Int32(1)), Ok(Value::Boolean(false)));
        assert_eq!(
            evaluate(&failing, &Value::Int32(1)),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_member_access_and_null() {
        let point = ClassDef::builder("Point")
            .field("X", Type::Int32)
            .build();
        let member = Member {
            name: "X".to_string(),
            ty: Type::Int32,
            kind: MemberKind::Field(0),
        };
        let expr = Expr::new(
            ExprKind::Member {
                target: Box::new(Expr::parameter(0, point.ty())),
                member,
            },
            Type::Int32,
        );
        let p = Value::object(&point, vec![Value::Int32(4)]);
        assert_eq!(evaluate(&expr, &p), Ok(Value::Int32(4)));
        assert!(matches!(
            evaluate(&expr, &Value::Null),
            Err(EvalError::NullReference { .. })
        ));
    }

    #[test]
    fn test_sequence_lambda_sees_parent_frame() {
        // @0.Any($ == ^) with the outer element at depth 0
        let body = Expr::binary(
            BinaryOperator::Eq,
            Expr::parameter(1, Type::Int32),
            Expr::parameter(0, Type::Int32),
            Type::Boolean,
        );
        let call = Expr::new(
            ExprKind::SequenceCall {
                target: Box::new(Expr::literal(Value::from(vec![3, 7]))),
                method: SequenceMethod::Any,
                lambda: Some(Box::new(body)),
                arg: None,
            },
            Type::Boolean,
        );
        assert_eq!(evaluate(&call, &Value::Int32(7)), Ok(Value::Boolean(true)));
        assert_eq!(evaluate(&call, &Value::Int32(4)), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_deferred_placeholder_reruns() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let expr = Expr::new(
            ExprKind::Placeholder {
                index: 0,
                value: PlaceholderValue::Deferred(Arc::new(move || {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(Value::Int32(1))
                })),
            },
            Type::Int32,
        );
        let eval = emit(&expr);
        eval(&Env::new(&Value::Null)).unwrap();
        eval(&Env::new(&Value::Null)).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn test_conversion_and_unary() {
        let widened = Expr::convert(int_param(), Type::Int64, None);
        assert_eq!(evaluate(&widened, &Value::Int32(5)), Ok(Value::Int64(5)));

        let negated = Expr::unary(UnaryOperator::Negate, int_param());
        assert_eq!(evaluate(&negated, &Value::Int32(5)), Ok(Value::Int32(-5)));

        let nullable = Expr::convert(int_param(), Type::nullable(Type::Int64), None);
        assert_eq!(evaluate(&nullable, &Value::Null), Ok(Value::Null));
    }

    #[test]
    fn test_index() {
        let expr = Expr::new(
            ExprKind::Index {
                target: Box::new(Expr::parameter(0, Type::sequence(Type::Int32))),
                index: Box::new(Expr::literal(Value::Int32(1))),
            },
            Type::Int32,
        );
        assert_eq!(
            evaluate(&expr, &Value::from(vec![5, 6])),
            Ok(Value::Int32(6))
        );
        assert!(matches!(
            evaluate(&expr, &Value::from(vec![5])),
            Err(EvalError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }
}
