// Shared sample models and a tiny query pipeline for integration tests

#![allow(dead_code)]

use anyhow::Result;
use dynexpr::{
    ClassDef, ClassRef, EnumDef, EnumRef, EvalError, EvalResult, ExpressionCompiler, Parameter,
    Type, TypeRegistry, Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Login time of the first generated user, in milliseconds since the epoch
pub const BASE_LOGIN_MS: i64 = 1_700_000_000_000;
pub const MINUTE_MS: i64 = 60_000;

pub const STANDARD_ROLES: [&str; 6] = ["Admin", "User", "Guest", "G", "J", "A"];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn compiler() -> ExpressionCompiler {
    init_logging();
    ExpressionCompiler::new(Arc::new(TypeRegistry::new()))
}

fn millis(value: &Value) -> EvalResult<i64> {
    match value {
        Value::DateTime(ms) => Ok(*ms),
        Value::Object(obj) => match obj.get("Ticks") {
            Some(Value::DateTime(ms)) => Ok(*ms),
            _ => Err(EvalError::evaluation("UtcDateTime without ticks")),
        },
        other => Err(EvalError::evaluation(format!(
            "cannot read a timestamp from {}",
            other.type_name()
        ))),
    }
}

fn compare_millis(a: &Value, b: &Value) -> EvalResult<Option<Ordering>> {
    Ok(Some(millis(a)?.cmp(&millis(b)?)))
}

/// Class and enum definitions shared by the tests
pub struct Models {
    pub user: ClassRef,
    pub profile: ClassRef,
    pub role: ClassRef,
    pub utc_date_time: ClassRef,
    pub uri: ClassRef,
    pub tuple: ClassRef,
    pub user_group: EnumRef,
    pub test_enum: EnumRef,
    roles: Vec<Value>,
}

impl Models {
    pub fn new() -> Self {
        let user_group = EnumDef::builder("UserGroup")
            .underlying(Type::UInt8)
            .variant("ADMIN", 0)
            .variant("MEMBER", 1)
            .variant("GUEST", 2)
            .exposed()
            .build();
        let test_enum = EnumDef::builder("TestEnum")
            .variant("Var1", 0)
            .variant("Var2", 1)
            .variant("Var3", 2)
            .variant("Var4", 4)
            .variant("Var5", 8)
            .variant("Var6", 16)
            .exposed()
            .build();

        // comparable with itself and with DateTime in either operand order
        let utc_date_time = ClassDef::builder("UtcDateTime")
            .field("Ticks", Type::DateTime)
            .compare_with_self(compare_millis)
            .compare_with(Type::DateTime, compare_millis)
            .exposed()
            .build();
        let profile = ClassDef::builder("UserProfile")
            .field("FirstName", Type::String)
            .field("LastName", Type::String)
            .field("Age", Type::nullable(Type::Int32))
            .build();
        let role = ClassDef::builder("Role")
            .field("Id", Type::Guid)
            .field("Name", Type::String)
            .build();
        let user = ClassDef::builder("User")
            .field("Id", Type::Guid)
            .field("UserName", Type::String)
            .field("Income", Type::Int32)
            .field("Profile", profile.ty())
            .field("Roles", Type::sequence(role.ty()))
            .field("LastLogin", utc_date_time.ty())
            .field("Group", user_group.ty())
            .build();
        let uri = ClassDef::builder("Uri")
            .field("Value", Type::String)
            .structural_equality()
            .build();
        let tuple = ClassDef::builder("Tuple")
            .field("Item1", Type::Int32)
            .field("Item2", Type::Int32)
            .field("Item3", Type::Int32)
            .build();

        let roles = STANDARD_ROLES
            .iter()
            .map(|name| Value::object(&role, vec![Value::from(Uuid::new_v4()), Value::from(*name)]))
            .collect();

        Models {
            user,
            profile,
            role,
            utc_date_time,
            uri,
            tuple,
            user_group,
            test_enum,
            roles,
        }
    }

    pub fn standard_roles(&self) -> Vec<Value> {
        self.roles.clone()
    }

    pub fn utc(&self, ms: i64) -> Value {
        Value::object(&self.utc_date_time, vec![Value::DateTime(ms)])
    }

    pub fn uri(&self, text: &str) -> Value {
        Value::object(&self.uri, vec![Value::from(text)])
    }

    pub fn tuple(&self, a: i32, b: i32, c: i32) -> Value {
        Value::object(
            &self.tuple,
            vec![Value::Int32(a), Value::Int32(b), Value::Int32(c)],
        )
    }

    /// `total` users; with `allow_null_profiles` every user with `i % 8 == 5` has no profile
    pub fn users(&self, total: usize, allow_null_profiles: bool) -> Vec<Value> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        (0..total)
            .map(|i| {
                let profile = if allow_null_profiles && i % 8 == 5 {
                    Value::Null
                } else {
                    Value::object(
                        &self.profile,
                        vec![
                            Value::from(format!("FirstName{}", i)),
                            Value::from(format!("LastName{}", i)),
                            Value::Int32((i % 50) as i32 + 18),
                        ],
                    )
                };
                Value::object(
                    &self.user,
                    vec![
                        Value::Guid(Uuid::from_u128(rng.gen())),
                        Value::from(format!("User{}", i)),
                        Value::Int32((i % 15) as i32 * 100),
                        profile,
                        Value::from(self.standard_roles()),
                        self.utc(BASE_LOGIN_MS + i as i64 * MINUTE_MS),
                        self.user_group.value(["ADMIN", "MEMBER", "GUEST"][i % 3]),
                    ],
                )
            })
            .collect()
    }

    /// Copy of `user` with its roles replaced
    pub fn with_roles(&self, user: &Value, roles: Vec<Value>) -> Value {
        let obj = user.as_object().expect("user object");
        let mut fields = obj.fields.clone();
        if let Some(index) = self.user.field_index("Roles") {
            fields[index] = Value::sequence(roles);
        }
        Value::object(&self.user, fields)
    }
}

pub fn field(value: &Value, name: &str) -> Value {
    value
        .as_object()
        .and_then(|obj| obj.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Elements of `items` the predicate accepts
pub fn filter(
    compiler: &ExpressionCompiler,
    element: &Type,
    items: &[Value],
    text: &str,
    params: Vec<Parameter>,
) -> Result<Vec<Value>> {
    let predicate = compiler.compile_predicate(element, text, params)?;
    let mut selected = vec![];
    for item in items {
        if predicate.test(item)? {
            selected.push(item.clone());
        }
    }
    Ok(selected)
}

/// Projected values together with their static type
pub fn project(
    compiler: &ExpressionCompiler,
    element: &Type,
    items: &[Value],
    text: &str,
) -> Result<(Type, Vec<Value>)> {
    let selector = compiler.compile(element, text, vec![])?;
    let projected = items
        .iter()
        .map(|item| selector.invoke(item))
        .collect::<EvalResult<Vec<_>>>()?;
    Ok((selector.result_type().clone(), projected))
}

/// Group `items` by a key expression, keeping first-seen key order
pub fn group_by(
    compiler: &ExpressionCompiler,
    element: &Type,
    items: &[Value],
    key: &str,
) -> Result<(Type, Vec<Value>)> {
    let selector = compiler.compile(element, key, vec![])?;
    let mut groups: Vec<(Value, Vec<Value>)> = vec![];
    for item in items {
        let key = selector.invoke(item)?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item.clone()),
            None => groups.push((key, vec![item.clone()])),
        }
    }
    let ty = Type::grouping(selector.result_type().clone(), element.clone());
    Ok((
        ty,
        groups
            .into_iter()
            .map(|(key, members)| Value::grouping(key, members))
            .collect(),
    ))
}
