use autoscope_core::{
    driver::{Prefixes, Row},
    stmt::{Formula, Value},
};
use std::cmp::Ordering;

/// Row lookup used to follow relational paths: `(table, id)` to a row.
pub(crate) trait RowSource {
    fn row_by_id(&self, table: &str, id: i64) -> Option<Row>;
}

/// Evaluates a formula against one row, following `__`-separated
/// relational paths through `source`.
pub(crate) fn eval(
    source: &dyn RowSource,
    prefixes: &Prefixes,
    row: &Row,
    formula: &Formula,
) -> bool {
    match formula {
        Formula::Tautology => true,
        Formula::Value(vs) => {
            let lhs = resolve(source, prefixes, row, &vs.attr);
            compare(&lhs, &vs.op, &vs.value)
        }
        Formula::Attr(attr) => {
            let lhs = resolve(source, prefixes, row, &attr.attr_a);
            let rhs = resolve(source, prefixes, row, &attr.attr_b);
            compare(&lhs, &attr.op, &rhs)
        }
        Formula::And(and) => {
            eval(source, prefixes, row, &and.a) && eval(source, prefixes, row, &and.b)
        }
        Formula::Or(or) => eval(source, prefixes, row, &or.a) || eval(source, prefixes, row, &or.b),
        Formula::Not(not) => !eval(source, prefixes, row, &not.a),
    }
}

/// Resolves an attribute, hopping through inferred foreign keys for each
/// prefix segment. A broken hop resolves to null, which no comparison
/// matches (the LEFT JOIN analogue).
fn resolve(source: &dyn RowSource, prefixes: &Prefixes, row: &Row, attr: &str) -> Value {
    if !attr.contains("__") {
        return row.get(attr).cloned().unwrap_or(Value::Null);
    }

    let parts: Vec<&str> = attr.split("__").collect();
    let field = parts[parts.len() - 1];

    let mut current = row.clone();
    for depth in 0..parts.len() - 1 {
        let prefix = format!("__{}", parts[..=depth].join("__"));
        let Some(path) = prefixes.get(&prefix) else {
            return Value::Null;
        };
        let Some(id) = link_id(current.get(parts[depth])) else {
            return Value::Null;
        };
        match source.row_by_id(&path.table, id) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }

    current.get(field).cloned().unwrap_or(Value::Null)
}

/// Foreign-key values may arrive as integers or numeric strings.
fn link_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::I64(v) => Some(*v),
        Value::F64(v) if v.fract() == 0.0 => Some(*v as i64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn compare(lhs: &Value, op: &str, rhs: &Value) -> bool {
    if op == "LIKE" {
        return match (lhs, rhs) {
            (Value::String(text), Value::String(pattern)) => like_match(text, pattern),
            _ => false,
        };
    }

    match lhs.compare(rhs) {
        Some(ordering) => match op {
            "=" => ordering == Ordering::Equal,
            "!=" => ordering != Ordering::Equal,
            "<" => ordering == Ordering::Less,
            "<=" => ordering != Ordering::Greater,
            ">" => ordering == Ordering::Greater,
            ">=" => ordering != Ordering::Less,
            _ => false,
        },
        None => false,
    }
}

/// SQL LIKE with `%` (any run) and `_` (any single character).
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let mut ti = 0;
    let mut pi = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '_' || pattern[pi] == text[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < pattern.len() && pattern[pi] == '%' {
        pi += 1;
    }
    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscope_core::stmt::ValueSelection;

    struct NoRows;

    impl RowSource for NoRows {
        fn row_by_id(&self, _: &str, _: i64) -> Option<Row> {
            None
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("charlie", "char%"));
        assert!(like_match("charlie", "%lie"));
        assert!(like_match("charlie", "%arl%"));
        assert!(like_match("charlie", "ch_rlie"));
        assert!(!like_match("charlie", "char"));
        assert!(like_match("", "%"));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let row = row(&[("a", Value::I64(1))]);
        let formula = Formula::Value(ValueSelection::new("missing", "=", Value::Null));
        assert!(!eval(&NoRows, &Prefixes::new(), &row, &formula));

        let formula = Formula::Value(ValueSelection::new("missing", "!=", 5));
        assert!(!eval(&NoRows, &Prefixes::new(), &row, &formula));
    }

    #[test]
    fn ordering_ops() {
        let row = row(&[("n", Value::I64(5))]);
        for (op, value, expected) in [
            ("<", 6, true),
            ("<=", 5, true),
            (">", 5, false),
            (">=", 5, true),
            ("!=", 4, true),
        ] {
            let formula = Formula::Value(ValueSelection::new("n", op, value));
            assert_eq!(
                eval(&NoRows, &Prefixes::new(), &row, &formula),
                expected,
                "op {op}"
            );
        }
    }

    #[test]
    fn broken_hop_resolves_to_null() {
        let row = row(&[("venue", Value::I64(9))]);
        let formula = Formula::Value(ValueSelection::new("venue__name", "=", "x"));
        // No prefix entry and no target row either way.
        assert!(!eval(&NoRows, &Prefixes::new(), &row, &formula));
    }
}
