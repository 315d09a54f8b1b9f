use crate::part::SqlPart;
use autoscope_core::{
    stmt::{valid_op, Formula},
    Error, Result,
};

/// Lowers a formula to an SQL fragment.
///
/// Leaves contribute one `%s` identifier placeholder per attribute and one
/// `?` per constant argument. Connectives bracket their operands and
/// concatenate identifier and argument lists left to right. `Tautology`
/// lowers to the literal `true`.
pub fn lower(formula: &Formula) -> Result<SqlPart> {
    match formula {
        Formula::Tautology => Ok(SqlPart::new("true")),

        Formula::Value(vs) => {
            if !valid_op(&vs.op) {
                return Err(Error::invalid_predicate(format!(
                    "unknown operator `{}` restricting `{}`",
                    vs.op, vs.attr
                )));
            }
            Ok(SqlPart {
                sql: format!("{} {} ?", cast("%s", vs.cast.as_deref()), vs.op),
                idents: vec![vs.attr.clone()],
                args: vec![vs.value.clone()],
            })
        }

        Formula::Attr(attr) => {
            if !valid_op(&attr.op) {
                return Err(Error::invalid_predicate(format!(
                    "unknown operator `{}` between `{}` and `{}`",
                    attr.op, attr.attr_a, attr.attr_b
                )));
            }
            Ok(SqlPart {
                sql: format!(
                    "{} {} {}",
                    cast("%s", attr.cast_a.as_deref()),
                    attr.op,
                    cast("%s", attr.cast_b.as_deref())
                ),
                idents: vec![attr.attr_a.clone(), attr.attr_b.clone()],
                args: vec![],
            })
        }

        Formula::Not(not) => {
            let inner = lower(&not.a)?;
            Ok(SqlPart {
                sql: format!("NOT ({})", inner.sql),
                idents: inner.idents,
                args: inner.args,
            })
        }

        Formula::And(and) => binary(&and.a, &and.b, "AND"),
        Formula::Or(or) => binary(&or.a, &or.b, "OR"),
    }
}

fn binary(a: &Formula, b: &Formula, connective: &str) -> Result<SqlPart> {
    let a = lower(a)?;
    let mut b = lower(b)?;

    let mut idents = a.idents;
    idents.append(&mut b.idents);
    let mut args = a.args;
    args.append(&mut b.args);

    Ok(SqlPart {
        sql: format!("({} {} {})", a.sql, connective, b.sql),
        idents,
        args,
    })
}

/// Wraps `contents` in an SQL type cast, or returns it untouched when no
/// cast applies.
fn cast(contents: &str, ty: Option<&str>) -> String {
    match ty {
        None | Some("") => contents.to_string(),
        Some(ty) => format!("({contents})::{ty}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscope_core::stmt::{AttrSelection, Value, ValueSelection};

    #[test]
    fn tautology_is_literal_true() {
        let part = lower(&Formula::Tautology).unwrap();
        assert_eq!(part.sql, "true");
        assert!(part.idents.is_empty());
        assert!(part.args.is_empty());
    }

    #[test]
    fn value_selection_shape() {
        let part = lower(&Formula::eq("price", 34)).unwrap();
        assert_eq!(part.sql, "%s = ?");
        assert_eq!(part.idents, vec!["price"]);
        assert_eq!(part.args, vec![Value::I64(34)]);
    }

    #[test]
    fn casts_wrap_the_placeholder() {
        let mut vs = ValueSelection::new("age", ">", 21);
        vs.cast = Some("int".to_string());
        let part = lower(&Formula::Value(vs)).unwrap();
        assert_eq!(part.sql, "(%s)::int > ?");
    }

    #[test]
    fn connectives_concatenate_left_to_right() {
        let or = Formula::or(
            Formula::eq("a", 1),
            Formula::Attr(AttrSelection::new("x", "=", "y")),
        );
        let and = Formula::and(or.clone(), Formula::not(or));

        let part = lower(&and).unwrap();
        assert_eq!(
            part.sql,
            "((%s = ? OR %s = %s) AND NOT ((%s = ? OR %s = %s)))"
        );
        assert_eq!(part.idents, vec!["a", "x", "y", "a", "x", "y"]);
        assert_eq!(part.args, vec![Value::I64(1), Value::I64(1)]);
    }

    #[test]
    fn placeholder_counts_match_ident_and_arg_counts() {
        let formula = Formula::and(
            Formula::eq("a", 1),
            Formula::or(
                Formula::Attr(AttrSelection::new("b", "<", "c")),
                Formula::not(Formula::eq("d", "x")),
            ),
        );
        let part = lower(&formula).unwrap();
        assert_eq!(part.sql.matches("%s").count(), part.idents.len());
        assert_eq!(part.sql.matches('?').count(), part.args.len());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let vs = ValueSelection::new("a", "=~", 1);
        let err = lower(&Formula::Value(vs)).unwrap_err();
        assert!(err.is_invalid_predicate());

        let attr = AttrSelection::new("a", "<>", "b");
        let err = lower(&Formula::Attr(attr)).unwrap_err();
        assert!(err.is_invalid_predicate());
    }
}
