//! Members and methods every resolver provides for primitive and structural types.

use crate::expression::{EvalError, EvalResult};
use crate::types::resolver::{Member, MemberKind};
use crate::types::{EnumRef, MethodDef, Type, Value};
use std::sync::Arc;

fn arg_str(args: &[Value], index: usize) -> EvalResult<&str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) => Err(EvalError::null_reference(format!("argument {}", index))),
        other => Err(EvalError::TypeMismatch {
            expected: "String".to_string(),
            actual: other.map(Value::type_name).unwrap_or_default(),
            context: format!("argument {}", index),
        }),
    }
}

fn arg_index(args: &[Value], index: usize) -> EvalResult<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| EvalError::TypeMismatch {
            expected: "Int32".to_string(),
            actual: args.get(index).map(Value::type_name).unwrap_or_default(),
            context: format!("argument {}", index),
        })
}

fn receiver_str(this: &Value) -> EvalResult<&str> {
    this.as_str()
        .ok_or_else(|| EvalError::null_reference("string receiver"))
}

/// `Substring` and friends work on char positions
fn char_slice(s: &str, start: i64, len: Option<i64>) -> EvalResult<String> {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len();
    let out_of_range = |index: i64| EvalError::IndexOutOfRange { index, len: total };
    if start < 0 || start as usize > total {
        return Err(out_of_range(start));
    }
    let start = start as usize;
    let end = match len {
        Some(len) if len < 0 || start + len as usize > total => {
            return Err(out_of_range(start as i64 + len))
        }
        Some(len) => start + len as usize,
        None => total,
    };
    Ok(chars[start..end].iter().collect())
}

pub(crate) fn to_string_method() -> Arc<MethodDef> {
    Arc::new(MethodDef::new("ToString", vec![], Type::String, |this, _| {
        Ok(Value::String(this.to_string()))
    }))
}

pub(crate) fn string_members() -> Vec<Member> {
    vec![Member {
        name: "Length".to_string(),
        ty: Type::Int32,
        kind: MemberKind::Property(Arc::new(|this| {
            Ok(Value::Int32(receiver_str(this)?.chars().count() as i32))
        })),
    }]
}

pub(crate) fn string_methods() -> Vec<Arc<MethodDef>> {
    let s = || Type::String;
    let predicate = |name: &str, f: fn(&str, &str) -> bool| {
        MethodDef::new(name, vec![Type::String], Type::Boolean, move |this, args| {
            Ok(Value::Boolean(f(receiver_str(this)?, arg_str(args, 0)?)))
        })
    };
    let transform = |name: &str, f: fn(&str) -> String| {
        MethodDef::new(name, vec![], Type::String, move |this, _| {
            Ok(Value::String(f(receiver_str(this)?)))
        })
    };

    vec![
        predicate("Contains", |a, b| a.contains(b)),
        predicate("StartsWith", |a, b| a.starts_with(b)),
        predicate("EndsWith", |a, b| a.ends_with(b)),
        predicate("Equals", |a, b| a == b),
        transform("ToUpper", str::to_uppercase),
        transform("ToLower", str::to_lowercase),
        transform("Trim", |a| a.trim().to_string()),
        MethodDef::new("Substring", vec![Type::Int32], s(), |this, args| {
            char_slice(receiver_str(this)?, arg_index(args, 0)?, None).map(Value::String)
        }),
        MethodDef::new(
            "Substring",
            vec![Type::Int32, Type::Int32],
            s(),
            |this, args| {
                char_slice(
                    receiver_str(this)?,
                    arg_index(args, 0)?,
                    Some(arg_index(args, 1)?),
                )
                .map(Value::String)
            },
        ),
        MethodDef::new("IndexOf", vec![Type::String], Type::Int32, |this, args| {
            let haystack = receiver_str(this)?;
            let index = haystack
                .find(arg_str(args, 0)?)
                .map(|byte| haystack[..byte].chars().count() as i32)
                .unwrap_or(-1);
            Ok(Value::Int32(index))
        }),
        MethodDef::new(
            "Replace",
            vec![Type::String, Type::String],
            s(),
            |this, args| {
                Ok(Value::String(
                    receiver_str(this)?.replace(arg_str(args, 0)?, arg_str(args, 1)?),
                ))
            },
        ),
    ]
    .into_iter()
    .map(Arc::new)
    .collect()
}

/// `HasValue` and `Value` on `T?`; both tolerate a null receiver
pub(crate) fn nullable_members(inner: &Type) -> Vec<Member> {
    vec![
        Member {
            name: "HasValue".to_string(),
            ty: Type::Boolean,
            kind: MemberKind::Property(Arc::new(|this| Ok(Value::Boolean(!this.is_null())))),
        },
        Member {
            name: "Value".to_string(),
            ty: inner.clone(),
            kind: MemberKind::Property(Arc::new(|this| {
                if this.is_null() {
                    Err(EvalError::null_reference("Nullable object must have a value"))
                } else {
                    Ok(this.clone())
                }
            })),
        },
    ]
}

pub(crate) fn nullable_methods(inner: &Type) -> Vec<Arc<MethodDef>> {
    let default = inner.default_value();
    vec![Arc::new(MethodDef::new(
        "GetValueOrDefault",
        vec![],
        inner.clone(),
        move |this, _| {
            Ok(if this.is_null() {
                default.clone()
            } else {
                this.clone()
            })
        },
    ))]
}

pub(crate) fn grouping_members(key: &Type) -> Vec<Member> {
    vec![Member {
        name: "Key".to_string(),
        ty: key.clone(),
        kind: MemberKind::Property(Arc::new(|this| match this {
            Value::Grouping(group) => Ok(group.key.clone()),
            other => Err(EvalError::TypeMismatch {
                expected: "IGrouping".to_string(),
                actual: other.type_name(),
                context: "member 'Key'".to_string(),
            }),
        })),
    }]
}

/// Enum constants surface as static members of the enum type
pub(crate) fn enum_members(def: &EnumRef) -> Vec<Member> {
    def.variants()
        .iter()
        .map(|(name, value)| Member {
            name: name.clone(),
            ty: def.ty(),
            kind: MemberKind::Constant(Value::enumeration(def, *value)),
        })
        .collect()
}

pub(crate) fn enum_methods(def: &EnumRef) -> Vec<Arc<MethodDef>> {
    vec![Arc::new(MethodDef::new(
        "HasFlag",
        vec![def.ty()],
        Type::Boolean,
        |this, args| {
            let flags = this.as_i64().unwrap_or_default();
            let flag = args.first().and_then(Value::as_i64).unwrap_or_default();
            Ok(Value::Boolean(flags & flag == flag))
        },
    ))]
}
