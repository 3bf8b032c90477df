use crate::tpl::ast::{Expr, Op, Test};
use crate::tpl::scope::Scope;
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Evaluates an expression. Total: every expression produces a value,
/// missing variables evaluate to `Value::Undefined`.
pub fn evaluate<'a>(expr: &'a Expr, scope: &'a Scope<'_>) -> Cow<'a, Value> {
    match expr {
        Expr::Literal(v) => Cow::Borrowed(v),
        Expr::Path(path) => Cow::Borrowed(scope.lookup(path)),
        Expr::List(items) => Cow::Owned(Value::List(
            items.iter().map(|e| evaluate(e, scope).into_owned()).collect(),
        )),
        Expr::Binary(Op::And, left, right) => {
            Cow::Owned(Value::Bool(is_true(left, scope) && is_true(right, scope)))
        }
        Expr::Binary(Op::Or, left, right) => {
            Cow::Owned(Value::Bool(is_true(left, scope) || is_true(right, scope)))
        }
        Expr::Binary(op, left, right) => {
            let l = evaluate(left, scope);
            let r = evaluate(right, scope);
            Cow::Owned(Value::Bool(compare(*op, &l, &r)))
        }
        Expr::Test(inner, test) => {
            let v = evaluate(inner, scope);
            let result = match test {
                Test::Defined => !v.is_undefined(),
                Test::NotDefined => v.is_undefined(),
                Test::Empty => v.is_empty(),
                Test::NotEmpty => !v.is_empty(),
            };
            Cow::Owned(Value::Bool(result))
        }
        Expr::Default(inner, fallback) => {
            let v = evaluate(inner, scope);
            if v.is_undefined() {
                evaluate(fallback, scope)
            } else {
                v
            }
        }
    }
}

/// Truthiness of an expression used as a condition.
pub fn is_true(expr: &Expr, scope: &Scope<'_>) -> bool {
    evaluate(expr, scope).is_truthy()
}

/// Numbers compare numerically and strings lexicographically. Equality on
/// any other pair is structural, so values of different types are never
/// equal. Ordering between types that cannot be ordered is always false.
pub fn compare(op: Op, l: &Value, r: &Value) -> bool {
    match op {
        Op::Eq => equals(l, r),
        Op::Ne => !equals(l, r),
        Op::Gt => ordering(l, r).is_some_and(Ordering::is_gt),
        Op::Ge => ordering(l, r).is_some_and(Ordering::is_ge),
        Op::Lt => ordering(l, r).is_some_and(Ordering::is_lt),
        Op::Le => ordering(l, r).is_some_and(Ordering::is_le),
        Op::And => l.is_truthy() && r.is_truthy(),
        Op::Or => l.is_truthy() || r.is_truthy(),
    }
}

fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => a == b,
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => l == r,
        },
    }
}

fn ordering(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::expr::parse_expr;
    use std::collections::BTreeMap;

    fn vars() -> Value {
        let mut m = BTreeMap::new();
        m.insert("a".to_string(), Value::Int(1));
        m.insert("b".to_string(), Value::Int(2));
        m.insert("f".to_string(), Value::Float(1.0));
        m.insert("name".to_string(), Value::from("bob"));
        m.insert("empty".to_string(), Value::List(vec![]));
        m.insert("nothing".to_string(), Value::Null);
        m.insert("zero".to_string(), Value::Int(0));
        Value::Map(m)
    }

    fn eval(src: &str) -> Value {
        let v = vars();
        let scope = Scope::root(&v);
        let expr = parse_expr(src).unwrap();
        evaluate(&expr, &scope).into_owned()
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(eval("a == 1"), Value::Bool(true));
        assert_eq!(eval("a == b"), Value::Bool(false));
        assert_eq!(eval("a == f"), Value::Bool(true));
        assert_eq!(eval("b > a"), Value::Bool(true));
        assert_eq!(eval("a >= 1.0"), Value::Bool(true));
        assert_eq!(eval("a < -3"), Value::Bool(false));
    }

    #[test]
    fn test_string_comparisons() {
        assert_eq!(eval("name == 'bob'"), Value::Bool(true));
        assert_eq!(eval("name < 'carl'"), Value::Bool(true));
        assert_eq!(eval("'10' < '9'"), Value::Bool(true));
    }

    #[test]
    fn test_mixed_types() {
        assert_eq!(eval("a == '1'"), Value::Bool(false));
        assert_eq!(eval("a != '1'"), Value::Bool(true));
        assert_eq!(eval("a > 'x'"), Value::Bool(false));
        assert_eq!(eval("a <= 'x'"), Value::Bool(false));
        assert_eq!(eval("missing == nothing"), Value::Bool(false));
        assert_eq!(eval("nothing == null"), Value::Bool(true));
    }

    #[test]
    fn test_logic_short_circuits() {
        assert_eq!(eval("zero and missing.x"), Value::Bool(false));
        assert_eq!(eval("a or missing"), Value::Bool(true));
        assert_eq!(eval("zero or empty or name"), Value::Bool(true));
        assert_eq!(eval("(a == 1 or b == 1) and name"), Value::Bool(true));
    }

    #[test]
    fn test_defined_differs_from_truthiness() {
        assert_eq!(eval("nothing is defined"), Value::Bool(true));
        assert_eq!(eval("zero is defined"), Value::Bool(true));
        assert_eq!(eval("missing is defined"), Value::Bool(false));
        assert_eq!(eval("missing is not defined"), Value::Bool(true));
        assert_eq!(eval("empty is empty"), Value::Bool(true));
        assert_eq!(eval("name is not empty"), Value::Bool(true));
    }

    #[test]
    fn test_default_only_replaces_undefined() {
        assert_eq!(eval("missing | default('D')"), Value::from("D"));
        assert_eq!(eval("name | default('D')"), Value::from("bob"));
        assert_eq!(eval("nothing | default('D')"), Value::Null);
        assert_eq!(eval("zero | default(5)"), Value::Int(0));
    }

    #[test]
    fn test_list_literal() {
        assert_eq!(
            eval("[a, 'x', missing]"),
            Value::List(vec![Value::Int(1), Value::from("x"), Value::Undefined])
        );
    }
}
