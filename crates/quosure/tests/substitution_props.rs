use proptest::prelude::*;
use quosure::{Config, Expr, Interpreter, Quosure, Value, combine, substitute, substitute_and_eval};

fn interpreter() -> Interpreter {
    let interpreter = Interpreter::new(Config::default());
    let global = interpreter.global();
    global.set_value("a", Value::Number(3.0));
    global.set_value("b", Value::from(vec![1.0, -2.0]));
    global.set_value("c", Value::Logical(true));
    interpreter
}

/// Arithmetic, comparisons and `c()` calls over literals and the names
/// bound by `interpreter()`. No markers.
fn plain_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-50i32..50).prop_map(|number| Expr::literal(f64::from(number))),
        prop::sample::select(vec!["a", "b", "c"]).prop_map(Expr::symbol),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (
                prop::sample::select(vec!["+", "-", "*", "/", "<", "=="]),
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(operator, left, right)| Expr::binary(operator, left, right)),
            prop::collection::vec(inner, 0..3).prop_map(|items| Expr::call("c", items)),
        ]
    })
}

proptest! {
    #[test]
    fn plain_trees_evaluate_the_same_with_substitution(expr in plain_expr()) {
        let mut interpreter = interpreter();
        let global = interpreter.global().clone();
        let direct = interpreter.eval(&expr, &global);
        let substituted = substitute_and_eval(&mut interpreter, &expr, &global);
        prop_assert_eq!(direct, substituted);
    }

    #[test]
    fn substitution_leaves_plain_trees_unchanged(expr in plain_expr()) {
        let mut interpreter = interpreter();
        let global = interpreter.global().clone();
        prop_assert_eq!(substitute(&mut interpreter, &expr, &global).unwrap(), expr);
    }

    #[test]
    fn splicing_contributes_one_argument_per_handle(numbers in prop::collection::vec(-9i32..9, 0..6)) {
        let mut interpreter = interpreter();
        let global = interpreter.global().clone();
        let handles = combine(numbers.iter().map(|number| {
            Quosure::new(Expr::literal(f64::from(*number)), global.clone())
        }));
        global.set_value("handles", Value::Quosures(handles));
        let length = interpreter.eval_source("length(c(!!!handles))").unwrap();
        prop_assert_eq!(length, Value::Number(numbers.len() as f64));
    }
}
