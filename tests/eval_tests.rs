use ripple::{Engine, ErrorValue, GraphError, RangeValue, Value, parse};

fn eval(text: &str) -> Value {
    Engine::new()
        .evaluate(text, None)
        .unwrap_or_else(|error| panic!("structural error for `{}`: {}", text, error))
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval("3+4*2"), Value::Number(11.0));
    assert_eq!(eval("(3+4)*2"), Value::Number(14.0));
    assert_eq!(eval("10 - 2 - 3"), Value::Number(5.0));
    assert_eq!(eval("7 / 2"), Value::Number(3.5));
}

#[test]
fn test_exponent_chains_fold_left_to_right() {
    // Documented associativity: 2^3^2 = (2^3)^2.
    assert_eq!(eval("2^3^2"), Value::Number(64.0));
    assert_eq!(eval("2^(3^2)"), Value::Number(512.0));
}

#[test]
fn test_negation_and_implicit_multiplication() {
    assert_eq!(eval("-3+4"), Value::Number(1.0));
    assert_eq!(eval("--3"), Value::Number(3.0));
    assert_eq!(eval("2(3+4)"), Value::Number(14.0));
    assert_eq!(eval("-2^2"), Value::Number(4.0));
}

#[test]
fn test_booleans_and_comparisons() {
    assert_eq!(eval("1 + 2 = 3"), Value::Bool(true));
    assert_eq!(eval("2 > 3"), Value::Bool(false));
    assert_eq!(eval("2 <= 2 and 3 != 4"), Value::Bool(true));
    assert_eq!(eval("true ^ false"), Value::Bool(true));
    assert_eq!(eval("!true or true"), Value::Bool(true));
    assert_eq!(eval("\"abc\" < \"abd\""), Value::Bool(true));
}

#[test]
fn test_bitwise_overloads_on_numbers() {
    assert_eq!(eval("6 & 3"), Value::Number(2.0));
    assert_eq!(eval("6 | 3"), Value::Number(7.0));
    assert_eq!(eval("6 xor 3"), Value::Number(5.0));
}

#[test]
fn test_strings() {
    assert_eq!(eval("\"foo\" + \"bar\""), Value::Str("foobar".into()));
    assert_eq!(eval("\"hello\"[1]"), Value::Str("e".into()));
}

#[test]
fn test_ternary() {
    assert_eq!(eval("2 > 1 ? 10 : 20"), Value::Number(10.0));
    assert_eq!(eval("2 < 1 ? 10 : 20"), Value::Number(20.0));
    assert_eq!(eval("false ? 1/0 : 5"), Value::Number(5.0));
}

#[test]
fn test_vectors_and_indexing() {
    assert_eq!(
        eval("{1, 2, 3}"),
        Value::Vector(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0)
        ])
    );
    assert_eq!(eval("{10, 20, 30}[1]"), Value::Number(20.0));
    assert_eq!(eval("{1, 2; 3, 4}[0][1]"), Value::Number(2.0));
}

#[test]
fn test_ranges() {
    assert_eq!(eval("2:6"), Value::Range(RangeValue::new(2.0, 6.0)));
    assert_eq!(eval("(2:6)[3]"), Value::Number(5.0));
}

#[test]
fn test_builtin_functions() {
    assert_eq!(eval("min(3, 1, 2)"), Value::Number(1.0));
    assert_eq!(eval("max(3, 1, 2)"), Value::Number(3.0));
    assert_eq!(eval("sum(1, 2, 3)"), Value::Number(6.0));
    assert_eq!(eval("abs(0 - 5)"), Value::Number(5.0));
    assert_eq!(eval("len({1, 2, 3})"), Value::Number(3.0));
    assert_eq!(eval("min(sum(1, 2), 4)"), Value::Number(3.0));
}

#[test]
fn test_unknown_function_is_structural() {
    let error = Engine::new().evaluate("frobnicate(1)", None).unwrap_err();
    assert_eq!(
        error,
        GraphError::UnknownFunction {
            name: "frobnicate".into()
        }
    );
}

#[test]
fn test_division_by_zero_flows_as_a_value() {
    assert_eq!(eval("1/0"), Value::error(ErrorValue::DivisionByZero));
    // The error propagates through ancestors like any value.
    assert_eq!(eval("(1/0) + 5"), Value::error(ErrorValue::DivisionByZero));
}

#[test]
fn test_type_mismatch_names_position_and_overload() {
    match eval("1 * true") {
        Value::Error(error) => match *error {
            ErrorValue::TypeMismatch {
                function,
                constraint,
                position,
                inputs,
            } => {
                assert_eq!(function, "multiply");
                assert_eq!(constraint, 0);
                assert_eq!(position, 1);
                assert_eq!(inputs, vec![Value::Number(1.0), Value::Bool(true)]);
            }
            other => panic!("expected type mismatch, got {}", other),
        },
        other => panic!("expected an error value, got {}", other),
    }
}

#[test]
fn test_index_errors() {
    assert_eq!(
        eval("{1, 2}[5]"),
        Value::error(ErrorValue::Index { index: 5, len: 2 })
    );
    assert_eq!(
        eval("{1, 2}[0 - 1]"),
        Value::error(ErrorValue::Index { index: -1, len: 2 })
    );
}

#[test]
fn test_errors_stay_local_to_vector_elements() {
    let value = eval("{1/0, 2}");
    match value {
        Value::Vector(elements) => {
            assert!(elements[0].is_error());
            assert_eq!(elements[1], Value::Number(2.0));
        }
        other => panic!("expected a vector, got {}", other),
    }
}

#[test]
fn test_evaluation_is_deterministic() {
    for text in ["3+4*2", "2^3^2", "min(1, 2) + max(3, 4)", "{1, 2; 3, 4}"] {
        assert_eq!(eval(text), eval(text), "re-evaluating `{}` diverged", text);
    }
}

#[test]
fn test_round_trip_through_display() {
    for text in [
        "3+4*2",
        "-x + 1",
        "2(3+4)",
        "{1, 2, 3}",
        "{1, 2; 3, 4}",
        "a ? 1 : 2",
        "1:5",
        "min(1, 2+3)",
    ] {
        let ast = parse(text).expect("parse failed");
        let reparsed = parse(&ast.to_string()).expect("display did not re-parse");
        assert_eq!(
            ast.to_string(),
            reparsed.to_string(),
            "round trip drifted for `{}`",
            text
        );
    }
    // Value-level round trip for closed expressions.
    for text in ["3+4*2", "{1, 2, 3}", "2^3^2", "1:5"] {
        let ast = parse(text).expect("parse failed");
        assert_eq!(eval(text), eval(&ast.to_string()));
    }
}

#[test]
fn test_postfix_evaluate_passes_through() {
    assert_eq!(eval("(3+4)?"), Value::Number(7.0));
    assert_eq!(eval("x?"), eval("x"));
}
