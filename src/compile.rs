//! Compile entry points.
//!
//! [`ExpressionCompiler`] turns expression text into executable closures:
//! plain lambdas, predicates, typed projections and ordering keys. Compiled
//! results are `Send + Sync` and can be shared across threads.

use crate::binder::{overload, Parameter, Parser};
use crate::error::{CompileResult, ParseError};
use crate::expression::{emit, Env, Eval, EvalError, EvalResult, Expr};
use crate::types::{MemberResolver, Type, Value};
use log::debug;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Compiles expressions against a shared resolver
#[derive(Clone)]
pub struct ExpressionCompiler {
    resolver: Arc<dyn MemberResolver>,
}

impl ExpressionCompiler {
    pub fn new(resolver: Arc<dyn MemberResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<dyn MemberResolver> {
        &self.resolver
    }

    /// Parse and bind `text` over elements of type `element`
    pub fn parse(&self, element: &Type, text: &str, params: Vec<Parameter>) -> CompileResult<Expr> {
        debug!("Compiling '{}' over {}", text, element);
        let expr = Parser::new(text, element.clone(), params, self.resolver.as_ref())?.parse()?;
        debug!("Bound '{}' to {}", text, expr.ty);
        Ok(expr)
    }

    pub fn compile(
        &self,
        element: &Type,
        text: &str,
        params: Vec<Parameter>,
    ) -> CompileResult<CompiledLambda> {
        Ok(CompiledLambda::new(self.parse(element, text, params)?))
    }

    /// Compile a filter; the expression must be `Boolean`
    pub fn compile_predicate(
        &self,
        element: &Type,
        text: &str,
        params: Vec<Parameter>,
    ) -> CompileResult<Predicate> {
        let body = self.parse(element, text, params)?;
        if body.ty != Type::Boolean {
            return Err(ParseError::TypeMismatch {
                expected: Type::Boolean.to_string(),
                actual: body.ty.to_string(),
                offset: 0,
            }
            .into());
        }
        Ok(Predicate {
            lambda: CompiledLambda::new(body),
        })
    }

    /// Compile a selector, implicitly converted to `result` when given
    pub fn compile_projection(
        &self,
        element: &Type,
        text: &str,
        params: Vec<Parameter>,
        result: Option<&Type>,
    ) -> CompileResult<CompiledLambda> {
        let body = self.parse(element, text, params)?;
        let body = match result {
            Some(target) if *target != body.ty => {
                overload::promote(self.resolver.as_ref(), &body, target, true)
                    .map(|promoted| promoted.expr)
                    .ok_or_else(|| ParseError::TypeMismatch {
                        expected: target.to_string(),
                        actual: body.ty.to_string(),
                        offset: 0,
                    })?
            }
            _ => body,
        };
        Ok(CompiledLambda::new(body))
    }

    /// Compile `key [asc|desc], ...` into ordering keys
    pub fn compile_ordering(
        &self,
        element: &Type,
        text: &str,
        params: Vec<Parameter>,
    ) -> CompileResult<Vec<OrderingKey>> {
        debug!("Compiling ordering '{}' over {}", text, element);
        let clauses = Parser::new(text, element.clone(), params, self.resolver.as_ref())?
            .parse_ordering()?;
        Ok(clauses
            .into_iter()
            .map(|clause| OrderingKey {
                key: CompiledLambda::new(clause.expr),
                descending: clause.descending,
            })
            .collect())
    }
}

/// Bound expression together with its executable closure
#[derive(Clone)]
pub struct CompiledLambda {
    body: Expr,
    eval: Eval,
}

impl CompiledLambda {
    pub fn new(body: Expr) -> Self {
        let eval = emit(&body);
        Self { body, eval }
    }

    pub fn invoke(&self, element: &Value) -> EvalResult<Value> {
        (self.eval)(&Env::new(element))
    }

    pub fn result_type(&self) -> &Type {
        &self.body.ty
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }
}

impl fmt::Debug for CompiledLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledLambda({})", self.body.ty)
    }
}

/// Compiled Boolean filter
#[derive(Debug, Clone)]
pub struct Predicate {
    lambda: CompiledLambda,
}

impl Predicate {
    pub fn test(&self, element: &Value) -> EvalResult<bool> {
        match self.lambda.invoke(element)? {
            Value::Boolean(result) => Ok(result),
            other => Err(EvalError::TypeMismatch {
                expected: Type::Boolean.to_string(),
                actual: other.type_name(),
                context: "predicate".to_string(),
            }),
        }
    }

    pub fn lambda(&self) -> &CompiledLambda {
        &self.lambda
    }
}

/// One key of a compiled ordering
#[derive(Debug, Clone)]
pub struct OrderingKey {
    pub key: CompiledLambda,
    pub descending: bool,
}

impl OrderingKey {
    pub fn compare(&self, a: &Value, b: &Value) -> EvalResult<Ordering> {
        let ordering = compare_keys(&self.key.invoke(a)?, &self.key.invoke(b)?);
        Ok(if self.descending {
            ordering.reverse()
        } else {
            ordering
        })
    }
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or(Ordering::Equal)
}

/// Stable sort of `items` by `keys`, earlier keys first
pub fn sort_by_keys(items: Vec<Value>, keys: &[OrderingKey]) -> EvalResult<Vec<Value>> {
    let mut keyed = items
        .into_iter()
        .map(|item| {
            let values = keys
                .iter()
                .map(|k| k.key.invoke(&item))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok((values, item))
        })
        .collect::<EvalResult<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b))
            .map(|(key, (x, y))| {
                let ordering = compare_keys(x, y);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::types::{ClassDef, ClassRef, TypeRegistry};
    use std::thread;

    fn item_class() -> ClassRef {
        ClassDef::builder("Item")
            .field("Name", Type::String)
            .field("Price", Type::Int32)
            .build()
    }

    fn item(class: &ClassRef, name: &str, price: i32) -> Value {
        Value::object(class, vec![Value::from(name), Value::Int32(price)])
    }

    fn compiler() -> ExpressionCompiler {
        ExpressionCompiler::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_compile_and_invoke() {
        let class = item_class();
        let lambda = compiler()
            .compile(&class.ty(), "Price * 2", vec![])
            .unwrap();
        assert_eq!(lambda.result_type(), &Type::Int32);
        assert_eq!(lambda.invoke(&item(&class, "a", 21)), Ok(Value::Int32(42)));
    }

    #[test]
    fn test_predicate_requires_boolean() {
        let class = item_class();
        let compiler = compiler();
        let predicate = compiler
            .compile_predicate(&class.ty(), "Price > @0", vec![Parameter::constant(10)])
            .unwrap();
        assert_eq!(predicate.test(&item(&class, "a", 11)), Ok(true));
        assert_eq!(predicate.test(&item(&class, "b", 9)), Ok(false));

        let err = compiler
            .compile_predicate(&class.ty(), "Price", vec![])
            .unwrap_err();
        assert!(matches!(err, CompileError::Parse(ParseError::TypeMismatch { .. })));
    }

    #[test]
    fn test_projection_result_type() {
        let class = item_class();
        let compiler = compiler();
        let lambda = compiler
            .compile_projection(&class.ty(), "Price", vec![], Some(&Type::Float64))
            .unwrap();
        assert_eq!(lambda.result_type(), &Type::Float64);
        assert_eq!(lambda.invoke(&item(&class, "a", 3)), Ok(Value::Float64(3.0)));

        let err = compiler
            .compile_projection(&class.ty(), "Name", vec![], Some(&Type::Int32))
            .unwrap_err();
        assert!(matches!(err, CompileError::Parse(ParseError::TypeMismatch { .. })));
    }

    #[test]
    fn test_ordering_keys() {
        let class = item_class();
        let keys = compiler()
            .compile_ordering(&class.ty(), "Price desc, Name", vec![])
            .unwrap();
        let items = vec![
            item(&class, "b", 1),
            item(&class, "c", 5),
            item(&class, "a", 1),
        ];
        let sorted = sort_by_keys(items, &keys).unwrap();
        let names: Vec<_> = sorted
            .iter()
            .map(|v| v.as_object().unwrap().get("Name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(
            keys[0].compare(&sorted[0], &sorted[1]),
            Ok(Ordering::Less)
        );
    }

    #[test]
    fn test_compiled_lambda_is_shareable() {
        let class = item_class();
        let lambda = compiler()
            .compile(&class.ty(), "Name + '-' + Price", vec![])
            .unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lambda = lambda.clone();
                let class = class.clone();
                thread::spawn(move || lambda.invoke(&item(&class, "x", i)))
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(
                handle.join().unwrap(),
                Ok(Value::from(format!("x-{}", i)))
            );
        }
    }
}
