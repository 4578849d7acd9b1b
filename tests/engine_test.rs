//! End-to-end scripts through the rank-dispatch engine.

use arpel::{
    run_test, Error, EvalError, OpDescriptor, OpInput, OpValue, Rank, RankOut, Registry, Session,
    SessionConfig, Value,
};
use pretty_assertions::assert_eq;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[test]
fn split_then_join_round_trips() {
    let out = run_test("!split\n!join sep=,\n", &["one two three"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("one,two,three".into())]);
}

#[test]
fn chained_commands_on_one_line() {
    let out = run_test("!split !join sep=,\n", &["a b c"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a,b,c".into())]);
}

#[test]
fn sort_orders_leaf_values() {
    run_test(
        "!split\n!sort\n!join\n!test-equal\n 1 2 3 4 5 8\n",
        &["3 1 4 2 8 5"],
    )
    .expect("assertion holds");
}

#[test]
fn grade_up_yields_sorting_permutation() {
    let out = run_test("!split\n!grade-up\n!join\n", &["3 1 4 2 8 5"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("1 3 0 2 5 4".into())]);
}

#[test]
fn keyval_pipeline_builds_a_dict_row() {
    let out = run_test(
        "!split sep=,\n!parse-keyval\n!combine-dict\n",
        &["a=1,b=2,c=3"],
    )
    .expect("runs");
    assert_eq!(
        out.to_json(),
        serde_json::json!([{"a": "1", "b": "2", "c": "3"}])
    );
}

#[test]
fn cross_pairs_every_row_with_the_referenced_table() {
    let script = "\
!test-input
 a
 b
!name left >t1
!test-input
 x
 y
 z
!name right
!cross <t1
!format
 {left}-{right}
!ravel
!join sep=,
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(
        out.values(),
        vec![Value::Str("a-x,b-x,a-y,b-y,a-z,b-z".into())]
    );
}

#[test]
fn recoverable_row_error_drops_only_that_row() {
    let session = Session::new(Registry::with_builtins());
    let out = session
        .run("!parse-keyval\n", &["a=1", "bad", "c=3"])
        .expect("runs");
    assert_eq!(out.len(), 2);
    assert_eq!(
        out.to_json(),
        serde_json::json!([{"a": "1"}, {"c": "3"}])
    );
}

#[test]
fn strict_mode_reraises_the_row_error() {
    let config = SessionConfig {
        strict: true,
        ..SessionConfig::default()
    };
    let session = Session::with_config(Registry::with_builtins(), config).expect("session");
    let err = session.run("!parse-keyval\n", &["a=1", "bad"]).unwrap_err();
    assert!(matches!(err, Error::Eval(EvalError::Op(_))));
}

#[test]
fn all_rows_failing_is_an_error() {
    let session = Session::new(Registry::with_builtins());
    let err = session.run("!parse-keyval\n", &["bad", "worse"]).unwrap_err();
    assert!(matches!(
        err,
        Error::Eval(EvalError::EmptyBroadcast { errors: 2 })
    ));
}

#[test]
fn abort_terminates_the_run() {
    let err = run_test("!split\n!abort stop\n", &["a b"]).unwrap_err();
    assert!(matches!(err, Error::Eval(EvalError::Abort(_))));
}

#[test]
fn dedup_keeps_first_appearance_order() {
    let out = run_test("!split\n!dedup\n!sort\n!join\n", &["b a c a b d"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a b c d".into())]);
}

#[test]
fn filter_keeps_truthy_rows_and_drops_the_flag_column() {
    let out = run_test(
        "!split\n!match ^a\n!filter\n!join\n",
        &["apple banana avocado"],
    )
    .expect("runs");
    assert_eq!(out.values(), vec![Value::Str("apple avocado".into())]);
}

#[test]
fn take_truncates_rows() {
    let script = "\
!test-input
 a
 b
 c
!take 2
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(out.len(), 2);
    assert_eq!(
        out.values(),
        vec![Value::Str("a".into()), Value::Str("b".into())]
    );
}

#[test]
fn ref_moves_a_column_back_into_focus() {
    let script = "\
!test-input
 a 1
 b 2
 c 3
!split-into k v
!ref k
!join
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a b c".into())]);
}

#[test]
fn columns_keeps_dropped_columns_reachable_through_the_parent() {
    let script = "\
!test-input
 a 1
 b 2
!split-into k v
!columns v
!format
 {k}-{v}
!join
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a-1 b-2".into())]);
}

#[test]
fn groupby_nests_member_rows_per_key() {
    let script = "\
!test-input
 x 1
 y 2
 x 3
!split-into k v
!groupby k
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(
        out.to_json(),
        serde_json::json!([
            {"k": "x", "value": [{"k": "x", "v": "1"}, {"k": "x", "v": "3"}]},
            {"k": "y", "value": [{"k": "y", "v": "2"}]},
        ])
    );
}

#[test]
fn unbox_strips_the_outer_layer() {
    let out = run_test("!split\n!unbox\n", &["a b c"]).expect("runs");
    assert_eq!(out.shape(), vec![3]);
    assert_eq!(
        out.values(),
        vec![
            Value::Str("a".into()),
            Value::Str("b".into()),
            Value::Str("c".into())
        ]
    );
}

#[test]
fn split_respects_maxsize_windows() {
    let out = run_test("!split maxsize=6\n!ravel\n", &["aaa bb cc dd"]).expect("runs");
    assert_eq!(
        out.values(),
        vec![
            Value::Str("aaa bb".into()),
            Value::Str("cc dd".into()),
        ]
    );
}

#[test]
fn global_binding_survives_input_replacement() {
    let script = "\
!split >>words
!test-input
 zzz
!join sep=- <<words
";
    let out = run_test(script, &["a b"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a-b".into())]);
}

#[test]
fn json_serializes_the_working_table() {
    let out = run_test("!split\n!json\n", &["a b"]).expect("runs");
    assert_eq!(
        out.values(),
        vec![Value::Str(
            r#"[{"value":[{"value":"a"},{"value":"b"}]}]"#.into()
        )]
    );
}

#[test]
fn def_registers_a_composite_operator() {
    let script = "\
!!def sorted-line
 !split
 !sort
 !join
!sorted-line
";
    let out = run_test(script, &["3 1 2"]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("1 2 3".into())]);
}

#[test]
fn test_json_asserts_the_export() {
    run_test(
        "!split sep=,\n!parse-keyval\n!combine-dict\n!test-json\n [{\"a\": \"1\", \"b\": \"2\"}]\n",
        &["a=1,b=2"],
    )
    .expect("assertion holds");
}

#[test]
fn nested_rows_resolve_enclosing_columns_through_row_parents() {
    // Rows produced by broadcasting carry no table parent, only row
    // parent links; template lookup must still reach the outer columns.
    let script = "\
!test-input
 a 1
 b 2
!split-into k v
!ref v
!split
!format
 {k}:{value}
!ravel
!join sep=,
";
    let out = run_test(script, &[]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("a:1,b:2".into())]);
}

#[test]
fn scalar_second_operand_pairs_cyclically() {
    let registry = Registry::with_builtins();
    registry.register(
        OpDescriptor::new("glue", Rank::Scalar, RankOut::Scalar, |_session, call| {
            let left = call.scalar()?.to_string();
            let right = match &call.second {
                OpInput::Scalar(v) => v.to_string(),
                other => {
                    return Err(EvalError::TypeMismatch {
                        expected: "scalar",
                        actual: other.kind(),
                    })
                }
            };
            Ok(OpValue::Scalar(Value::Str(format!("{}-{}", left, right))))
        })
        .arity(2)
        .rankin2(Rank::Scalar),
    );
    let session = Session::with_config(registry, SessionConfig::for_tests()).expect("session");

    // Two-row second operand against a three-row primary: the shorter
    // side wraps around.
    let script = "\
!test-input >t1
 s1
 s2
!test-input
 p1
 p2
 p3
!glue <t1
!join sep=,
";
    let out = session.run(script, &[]).expect("runs");
    assert_eq!(out.values(), vec![Value::Str("p1-s1,p2-s2,p3-s1".into())]);
}

#[test]
fn assertions_are_inert_outside_test_mode() {
    let session = Session::new(Registry::with_builtins());
    session
        .run("!test-equal\n never\n", &["actual"])
        .expect("no-op outside test mode");
}
