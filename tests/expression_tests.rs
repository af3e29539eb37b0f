mod support;

use anyhow::Result;
use dynexpr::{
    sort_by_keys, CompileError, EvalError, EvalResult, ParseError, Parameter, Type, Value,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use support::*;
use uuid::Uuid;

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Int32).collect()
}

#[test]
fn test_sum_over_grouping() -> Result<()> {
    let compiler = compiler();
    let values = ints(&[1, 2, 3, 4, 5]);
    let (anon, rows) = project(
        &compiler,
        &Type::Int32,
        &values,
        "new (\"str\" as strValue, it as intValue)",
    )?;
    let (grouping, groups) = group_by(&compiler, &anon, &rows, "strValue")?;
    assert_eq!(groups.len(), 1);

    let (ty, sums) = project(&compiler, &grouping, &groups, "Sum(intValue)")?;
    assert_eq!(ty, Type::Int32);
    assert_eq!(sums, vec![Value::Int32(15)]);
    Ok(())
}

#[test]
fn test_contains_guid() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(5, false);
    let user_ty = models.user.ty();

    let fail: Vec<Value> = [
        "22222222-7651-4045-962A-3D44DEE71398",
        "33333333-8F80-4497-9125-C96DEE23037D",
        "44444444-E32D-4DE1-8F1C-A144C2B0424D",
    ]
    .iter()
    .map(|s| Uuid::parse_str(s).map(Value::Guid))
    .collect::<Result<_, _>>()?;
    let mut success = fail.clone();
    success.push(field(&users[0], "Id"));

    let param = |values: &[Value]| vec![Parameter::constant(Value::sequence(values.to_vec()))];

    let found1 = filter(&compiler, &user_ty, &users, "Id in @0", param(&success))?;
    let found2 = filter(&compiler, &user_ty, &users, "@0.Contains(Id)", param(&success))?;
    assert_eq!(found1.len(), 1);
    assert_eq!(field(&found1[0], "Id"), field(&users[0], "Id"));
    assert_eq!(found1, found2);

    assert!(filter(&compiler, &user_ty, &users, "Id in @0", param(&fail))?.is_empty());
    assert!(filter(&compiler, &user_ty, &users, "@0.Contains(Id)", param(&fail))?.is_empty());
    Ok(())
}

#[test]
fn test_enum_comparisons() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let test_enum = &models.test_enum;
    let ty = test_enum.ty();
    let values: Vec<Value> = ["Var1", "Var2", "Var3", "Var4", "Var5", "Var6"]
        .iter()
        .map(|name| test_enum.value(name))
        .collect();
    let below_var4 = values[..3].to_vec();

    assert_eq!(filter(&compiler, &ty, &values, "it < TestEnum.Var4", vec![])?, below_var4);
    assert_eq!(filter(&compiler, &ty, &values, "TestEnum.Var4 > it", vec![])?, below_var4);

    let var5 = vec![test_enum.value("Var5")];
    assert_eq!(filter(&compiler, &ty, &values, "it = Var5", vec![])?, var5);
    assert_eq!(
        filter(&compiler, &ty, &values, "it = @0", vec![Parameter::constant(test_enum.value("Var5"))])?,
        var5
    );
    assert_eq!(
        filter(&compiler, &ty, &values, "it = @0", vec![Parameter::constant(8)])?,
        var5
    );
    assert_eq!(filter(&compiler, &ty, &values, "it = \"Var5\"", vec![])?, var5);
    Ok(())
}

#[test]
fn test_enum_member_with_different_underlying_type() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(10, false);
    let ty = models.user.ty();
    let group = &models.user_group;

    let admin_or_member = Value::sequence(vec![group.value("ADMIN"), group.value("MEMBER")]);
    let cases: Vec<(&str, Vec<Parameter>)> = vec![
        ("Group = @0", vec![Parameter::constant(group.value("ADMIN"))]),
        ("Group = \"ADMIN\"", vec![]),
        ("Group in @0", vec![Parameter::constant(admin_or_member)]),
        ("Group in @0", vec![Parameter::constant(vec![0, 1])]),
        ("@0.Contains(Group)", vec![Parameter::constant(vec![0, 1])]),
        ("Group = 1", vec![]),
        ("Group < 1", vec![]),
        ("Group != 1", vec![]),
        ("Group > 1", vec![]),
        ("Group = @0", vec![Parameter::constant(1)]),
    ];
    for (text, params) in cases {
        let found = filter(&compiler, &ty, &users, text, params)?;
        assert!(!found.is_empty(), "'{}' selected nothing", text);
    }

    let admins = filter(&compiler, &ty, &users, "Group = UserGroup.ADMIN", vec![])?;
    assert_eq!(admins.len(), 4);
    Ok(())
}

#[test]
fn test_compare_with_guid() -> Result<()> {
    let compiler = compiler();
    let list: Vec<Value> = [
        "1AF7AD2B-7651-4045-962A-3D44DEE71398",
        "99610563-8F80-4497-9125-C96DEE23037D",
        "0A191E77-E32D-4DE1-8F1C-A144C2B0424D",
    ]
    .iter()
    .map(|s| Uuid::parse_str(s).map(Value::Guid))
    .collect::<Result<_, _>>()?;
    let text = "0A191E77-E32D-4DE1-8F1C-A144C2B0424D";
    let expected = vec![list[2].clone()];

    let quoted = format!("it = \"{}\"", text);
    let reversed = format!("\"{}\" = it", text);
    assert_eq!(filter(&compiler, &Type::Guid, &list, &quoted, vec![])?, expected);
    assert_eq!(filter(&compiler, &Type::Guid, &list, &reversed, vec![])?, expected);
    assert_eq!(
        filter(&compiler, &Type::Guid, &list, "it = @0", vec![Parameter::constant(text)])?,
        expected
    );
    assert_eq!(
        filter(&compiler, &Type::Guid, &list, "it = @0", vec![Parameter::constant(list[2].clone())])?,
        expected
    );
    Ok(())
}

#[test]
fn test_shift() -> Result<()> {
    let compiler = compiler();
    let values = ints(&[10, 20, 30]);

    let (ty, shifted) = project(&compiler, &Type::Int32, &values, "it << 1")?;
    assert_eq!(ty, Type::Int32);
    assert_eq!(shifted, ints(&[20, 40, 60]));
    assert_eq!(project(&compiler, &Type::Int32, &values, "it >> 1")?.1, ints(&[5, 10, 15]));
    assert_eq!(
        filter(&compiler, &Type::Int32, &values, "it << 2 = 80", vec![])?,
        ints(&[20])
    );

    let (ty, _) = project(&compiler, &Type::Int32, &values, "Int64(it) << 1")?;
    assert_eq!(ty, Type::Int64);
    Ok(())
}

#[test]
fn test_logical_and_or() -> Result<()> {
    let compiler = compiler();
    let raw = [0x20, 0x21, 0x30, 0x31, 0x41];
    let values = ints(&raw);

    assert_eq!(
        filter(&compiler, &Type::Int32, &values, "(it & 1) > 0", vec![])?,
        ints(&[0x21, 0x31, 0x41])
    );
    let native: Vec<i32> = raw.iter().copied().filter(|x| (x & 32) > 0).collect();
    assert_eq!(
        filter(&compiler, &Type::Int32, &values, "(it & 32) > 0", vec![])?,
        ints(&native)
    );
    assert_eq!(
        filter(&compiler, &Type::Int32, &values, "(it | 1) = 0x21 || it == 0x41", vec![])?,
        ints(&[0x20, 0x21, 0x41])
    );
    Ok(())
}

#[test]
fn test_structural_equality() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let list = vec![
        models.uri("http://127.0.0.1"),
        models.uri("http://192.168.1.1"),
        models.uri("http://127.0.0.1"),
    ];
    let found = filter(
        &compiler,
        &models.uri.ty(),
        &list,
        "it = @0",
        vec![Parameter::constant(models.uri("http://127.0.0.1"))],
    )?;
    assert_eq!(found.len(), 2);
    Ok(())
}

#[test]
fn test_distinct_by_with_deferred_subquery() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let tuple_ty = models.tuple.ty();
    let list = vec![
        models.tuple(1, 1, 1),
        models.tuple(1, 1, 2),
        models.tuple(1, 1, 3),
        models.tuple(2, 2, 4),
        models.tuple(2, 2, 5),
        models.tuple(2, 2, 6),
        models.tuple(2, 3, 7),
    ];

    let (grouping, groups) = group_by(&compiler, &tuple_ty, &list, "Item1")?;
    let max = compiler.compile(&grouping, "it.Max(it.Item3)", vec![])?;
    assert_eq!(max.result_type(), &Type::Int32);

    let maxima = move || {
        groups
            .iter()
            .map(|group| max.invoke(group))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::sequence)
    };
    let subquery = Parameter::deferred(Type::sequence(Type::Int32), maxima);

    for text in [
        "@0.Any(it == parent.Item3)",
        "@0.Any($ == ^.Item3)",
        "@0.Any($ == ~.Item3)",
    ] {
        let found = filter(&compiler, &tuple_ty, &list, text, vec![subquery.clone()])?;
        assert_eq!(found.len(), 2, "{}", text);
    }
    Ok(())
}

#[test]
fn test_first_or_default_with_null_comparison() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let ty = models.user.ty();
    let mut users = models.users(2, false);
    users[0] = models.with_roles(&users[0], vec![]);

    let has_admin = |user: &Value| {
        field(user, "Roles")
            .items()
            .map(|roles| roles.iter().any(|r| field(r, "Name") == Value::from("Admin")))
            .unwrap_or(false)
    };
    let text = "Roles.FirstOrDefault(Name = \"Admin\") != null";

    let native = users.iter().find(|u| has_admin(u)).cloned();
    let dynamic = filter(&compiler, &ty, &users, text, vec![])?.into_iter().next();
    assert!(native.is_some());
    assert_eq!(native, dynamic);

    users[1] = models.with_roles(&users[1], vec![]);
    let native = users.iter().find(|u| has_admin(u)).cloned();
    let dynamic = filter(&compiler, &ty, &users, text, vec![])?.into_iter().next();
    assert_eq!(native, None);
    assert_eq!(dynamic, None);
    Ok(())
}

#[test]
fn test_custom_type_operators() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(100, false);
    let ty = models.user.ty();

    let found = filter(
        &compiler,
        &ty,
        &users,
        "LastLogin <= @0",
        vec![Parameter::constant(models.utc(BASE_LOGIN_MS))],
    )?;
    assert_eq!(found.len(), 1);

    let cutoff = Value::DateTime(BASE_LOGIN_MS + 50 * MINUTE_MS);
    let later = filter(&compiler, &ty, &users, "LastLogin > @0", vec![Parameter::constant(cutoff.clone())])?;
    let reversed = filter(&compiler, &ty, &users, "@0 < LastLogin", vec![Parameter::constant(cutoff)])?;
    assert_eq!(later.len(), 49);
    assert_eq!(later, reversed);
    Ok(())
}

#[test]
fn test_null_profiles() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(20, true);
    let ty = models.user.ty();

    let found = filter(&compiler, &ty, &users, "Profile != null and Profile.Age > 30", vec![])?;
    assert_eq!(found.len(), 6);

    let err = filter(&compiler, &ty, &users, "Profile.Age > 30", vec![]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EvalError>(),
        Some(EvalError::NullReference { .. })
    ));
    Ok(())
}

#[test]
fn test_in_list_matches_disjunction() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(30, false);
    let ty = models.user.ty();

    let listed = filter(&compiler, &ty, &users, "Income in (100, 200, 1400)", vec![])?;
    let ored = filter(
        &compiler,
        &ty,
        &users,
        "Income = 100 or Income = 200 or Income = 1400",
        vec![],
    )?;
    assert_eq!(listed.len(), 6);
    assert_eq!(listed, ored);
    Ok(())
}

#[test]
fn test_ordering_and_projection() -> Result<()> {
    let compiler = compiler();
    let models = Models::new();
    let users = models.users(20, false);
    let ty = models.user.ty();

    let keys = compiler.compile_ordering(&ty, "Income desc, UserName", vec![])?;
    let sorted = sort_by_keys(users.clone(), &keys)?;
    assert_eq!(field(&sorted[0], "UserName"), Value::from("User14"));
    assert_eq!(field(&sorted[1], "UserName"), Value::from("User13"));
    // incomes repeat every 15 users; ties fall back to the name
    assert_eq!(field(&sorted[19], "UserName"), Value::from("User15"));

    let selector = compiler.compile(&ty, "new (UserName, Income * 2 as Doubled)", vec![])?;
    let first = selector.invoke(&users[3])?;
    assert_eq!(first, selector.invoke(&users[3])?);
    assert_ne!(first, selector.invoke(&users[4])?);
    assert_eq!(field(&first, "Doubled"), Value::Int32(600));
    Ok(())
}

#[test]
fn test_compile_errors() {
    let compiler = compiler();
    let models = Models::new();
    let ty = models.user.ty();

    let err = compiler.compile(&ty, "UserName.Nope", vec![]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Parse(ParseError::UnknownMember { offset: 9, .. })
    ));
    let err = compiler.compile(&ty, "Group = \"NOPE\"", vec![]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Parse(ParseError::IncompatibleOperands { .. })
    ));
    let err = compiler.compile(&ty, "Income > @0", vec![]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Parse(ParseError::PlaceholderOutOfRange { index: 0, count: 0, .. })
    ));
    let err = compiler.compile_predicate(&ty, "Income", vec![]).unwrap_err();
    assert!(matches!(err, CompileError::Parse(ParseError::TypeMismatch { .. })));
}

#[test]
fn test_concurrent_compiles_agree() -> Result<()> {
    let compiler = Arc::new(compiler());
    let models = Models::new();
    let users = Arc::new(models.users(40, false));
    let ty = models.user.ty();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let compiler = compiler.clone();
            let users = users.clone();
            let ty = ty.clone();
            thread::spawn(move || {
                filter(
                    &compiler,
                    &ty,
                    &users,
                    "Income > @0 and UserName.StartsWith(\"User1\")",
                    vec![Parameter::constant(500)],
                )
                .map(|found| found.len())
            })
        })
        .collect();

    let counts = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect::<Result<Vec<_>>>()?;
    assert!(counts.iter().all(|c| *c == counts[0]));
    assert!(counts[0] > 0);
    Ok(())
}

fn eval_one(element: &Type, text: &str, params: Vec<Parameter>, value: Value) -> Value {
    compiler()
        .compile(element, text, params)
        .map(|lambda| lambda.invoke(&value))
        .expect("compiles")
        .expect("evaluates")
}

proptest! {
    #[test]
    fn prop_shift_matches_native_i32(x in any::<i32>(), n in -64i32..64) {
        let left = eval_one(&Type::Int32, "it << @0", vec![Parameter::constant(n)], Value::Int32(x));
        prop_assert_eq!(left, Value::Int32(x.wrapping_shl(n as u32)));
        let right = eval_one(&Type::Int32, "it >> @0", vec![Parameter::constant(n)], Value::Int32(x));
        prop_assert_eq!(right, Value::Int32(x.wrapping_shr(n as u32)));
    }

    #[test]
    fn prop_shift_matches_native_i64(x in any::<i64>(), n in 0i32..128) {
        let left = eval_one(&Type::Int64, "it << @0", vec![Parameter::constant(n)], Value::Int64(x));
        prop_assert_eq!(left, Value::Int64(x.wrapping_shl(n as u32)));
    }

    #[test]
    fn prop_narrow_shift_promotes(x in any::<u8>(), n in 0i32..40) {
        let value = eval_one(&Type::UInt8, "it << @0", vec![Parameter::constant(n)], Value::UInt8(x));
        prop_assert_eq!(value, Value::Int32((x as i32).wrapping_shl(n as u32)));
    }

    #[test]
    fn prop_enum_operand_order(index in 0usize..6) {
        let models = Models::new();
        let names = ["Var1", "Var2", "Var3", "Var4", "Var5", "Var6"];
        let values: Vec<Value> = names.iter().map(|n| models.test_enum.value(n)).collect();
        let ty = models.test_enum.ty();
        let compiler = compiler();
        let name = names[index];
        let underlying = models.test_enum.variant_value(name).unwrap_or_default() as i32;

        let expected = filter(&compiler, &ty, &values, &format!("it = TestEnum.{}", name), vec![]).unwrap();
        prop_assert_eq!(expected.len(), 1);
        for text in [format!("it = \"{}\"", name), format!("\"{}\" = it", name), format!("{} = it", name)] {
            prop_assert_eq!(&filter(&compiler, &ty, &values, &text, vec![]).unwrap(), &expected);
        }
        for param in [models.test_enum.value(name), Value::Int32(underlying)] {
            let forward = filter(&compiler, &ty, &values, "it = @0", vec![Parameter::constant(param.clone())]).unwrap();
            let backward = filter(&compiler, &ty, &values, "@0 = it", vec![Parameter::constant(param)]).unwrap();
            prop_assert_eq!(&forward, &expected);
            prop_assert_eq!(&backward, &expected);
        }
    }

    #[test]
    fn prop_contains_matches_in(
        haystack in proptest::collection::vec(0i32..20, 0..8),
        needles in proptest::collection::vec(0i32..20, 1..10),
    ) {
        let compiler = compiler();
        let items = ints(&needles);
        let param = || vec![Parameter::typed(
            Value::sequence(ints(&haystack)),
            Type::sequence(Type::Int32),
        )];
        let contains = filter(&compiler, &Type::Int32, &items, "@0.Contains(it)", param()).unwrap();
        let within = filter(&compiler, &Type::Int32, &items, "it in @0", param()).unwrap();
        prop_assert_eq!(contains, within);
    }
}
