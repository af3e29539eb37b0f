//! Argument promotion and cost-based overload selection.
//!
//! Each argument is promoted to its parameter type; a candidate's cost is the
//! sum of its argument conversion costs. The cheapest candidate wins and a tie
//! is broken by the number of exact matches, otherwise the call is ambiguous.

use crate::expression::{Expr, UserConversion};
use crate::types::conversion::{self, Conversion, ConversionKind};
use crate::types::{MemberResolver, MethodDef, Type, Value};
use std::sync::Arc;

/// Expression converted to a target type, with the cost of getting there
#[derive(Debug, Clone)]
pub struct Promotion {
    pub expr: Expr,
    pub cost: u32,
}

impl Promotion {
    fn exact(&self) -> bool {
        self.cost == conversion::COST_IDENTITY
    }
}

/// Wrap `expr` for an implicit conversion already known to apply
pub fn apply_conversion(expr: Expr, conv: &Conversion, target: &Type) -> Expr {
    match &conv.kind {
        ConversionKind::Identity => expr,
        ConversionKind::UserDefined { class, index } => Expr::convert(
            expr,
            target.clone(),
            Some(UserConversion {
                class: class.clone(),
                index: *index,
            }),
        ),
        ConversionKind::NullLiteral => expr.with_constant(Value::Null, target.clone()),
        _ => {
            // constants fold instead of converting on every evaluation
            let folded = expr
                .constant_value()
                .and_then(|value| value.cast(target).ok());
            match folded {
                Some(value) => expr.with_constant(value, target.clone()),
                None => Expr::convert(expr, target.clone(), None),
            }
        }
    }
}

/// Promote `expr` to `target` implicitly.
///
/// Constants first try value-based coercion (string to Guid or enum, integer
/// literals into narrower types). Conversions to `Object` are only considered
/// when `allow_object` is set.
pub fn promote(
    resolver: &dyn MemberResolver,
    expr: &Expr,
    target: &Type,
    allow_object: bool,
) -> Option<Promotion> {
    if &expr.ty == target {
        return Some(Promotion {
            expr: expr.clone(),
            cost: conversion::COST_IDENTITY,
        });
    }

    let implicit = resolver
        .implicit_conversion(&expr.ty, target)
        .filter(|c| allow_object || c.kind != ConversionKind::ToObject);

    if let Some(value) = expr.constant_value() {
        if let Some(coerced) = conversion::coerce_constant(value, target) {
            let cost = implicit
                .as_ref()
                .map(|c| c.cost)
                .unwrap_or(conversion::COST_WIDENING_BASE);
            return Some(Promotion {
                expr: expr.clone().with_constant(coerced, target.clone()),
                cost,
            });
        }
    }

    implicit.map(|conv| Promotion {
        expr: apply_conversion(expr.clone(), &conv, target),
        cost: conv.cost,
    })
}

/// Why no single overload could be chosen
#[derive(Debug, Clone, PartialEq)]
pub enum OverloadError {
    NoApplicable,
    /// Signatures of the tied candidates
    Ambiguous(Vec<String>),
}

/// Chosen overload with its promoted arguments
#[derive(Debug, Clone)]
pub struct OverloadMatch {
    pub method: Arc<MethodDef>,
    pub args: Vec<Expr>,
    total_cost: u32,
    exact: usize,
}

fn try_candidate(
    resolver: &dyn MemberResolver,
    method: &Arc<MethodDef>,
    args: &[Expr],
) -> Option<OverloadMatch> {
    if method.params.len() != args.len() {
        return None;
    }
    let promotions = args
        .iter()
        .zip(&method.params)
        .map(|(arg, param)| promote(resolver, arg, param, true))
        .collect::<Option<Vec<_>>>()?;

    Some(OverloadMatch {
        method: method.clone(),
        total_cost: promotions.iter().map(|p| p.cost).sum(),
        exact: promotions.iter().filter(|p| p.exact()).count(),
        args: promotions.into_iter().map(|p| p.expr).collect(),
    })
}

/// Pick the cheapest applicable overload for `args`
pub fn resolve(
    resolver: &dyn MemberResolver,
    candidates: &[Arc<MethodDef>],
    args: &[Expr],
) -> Result<OverloadMatch, OverloadError> {
    let mut viable: Vec<OverloadMatch> = candidates
        .iter()
        .filter_map(|method| try_candidate(resolver, method, args))
        .collect();

    if viable.is_empty() {
        return Err(OverloadError::NoApplicable);
    }
    viable.sort_by(|a, b| {
        a.total_cost
            .cmp(&b.total_cost)
            .then_with(|| b.exact.cmp(&a.exact))
    });

    if viable.len() > 1
        && viable[0].total_cost == viable[1].total_cost
        && viable[0].exact == viable[1].exact
    {
        let tied = viable
            .iter()
            .take_while(|m| m.total_cost == viable[0].total_cost && m.exact == viable[0].exact)
            .map(|m| m.method.signature())
            .collect();
        return Err(OverloadError::Ambiguous(tied));
    }

    Ok(viable.swap_remove(0))
}
