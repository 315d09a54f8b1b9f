//! Relational query planning over the dual-storage schema.
//!
//! Every logical table splits its fields between declared columns and the
//! JSON sidecar, and may not physically exist at all (its rows then live in
//! the shared unassigned table). The planner rewrites predicate identifiers
//! against that reality, synthesizes `LEFT JOIN`s for inferred relational
//! prefixes, and assembles the final statement frames.

use crate::{
    ident::{escape_ident, quote_expr},
    lower::lower,
    params::{question_to_positional, replace_identifiers},
};
use autoscope_core::{
    driver::Prefixes,
    schema::{Schema, UNASSIGNED_TABLE},
    stmt::{DeleteQuery, Formula, InsertQuery, SelectQuery, Value, ValueSelection},
    Error, Result,
};
use indexmap::IndexMap;
use std::collections::HashSet;

/// A fully rendered statement with its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Maps a logical table to its physical name.
pub fn physical_table(table_prefix: &str, table: &str) -> String {
    format!("{table_prefix}{table}")
}

/// Applies the unassigned redirect: a table absent from the schema is
/// replaced by the unassigned table, with a `table_name` restriction ANDed
/// onto the selection.
pub fn redirect(schema: &Schema, table: &str, selection: Formula) -> (String, Formula) {
    let table = table.to_lowercase();
    if schema.contains_key(&table) {
        return (table, selection);
    }
    let discriminator = Formula::Value(ValueSelection::new("table_name", "=", table));
    (
        UNASSIGNED_TABLE.to_string(),
        Formula::and(selection, discriminator),
    )
}

/// Rewrites one field reference for the current physical layout.
///
/// Plain fields resolve against the root table; `__`-separated fields
/// resolve their prefix through the precomputed relation paths. A field
/// whose table or column does not exist routes through the sidecar.
pub fn field_transform(
    schema: &Schema,
    prefixes: &Prefixes,
    field_name: &str,
    table_name: &str,
) -> String {
    if !field_name.contains("__") {
        let declared = schema
            .get(table_name)
            .is_some_and(|t| t.has_column(field_name));
        if declared {
            return format!("__root.{field_name}");
        }
        return format!("__root.autoscope_objectfields->>{field_name}");
    }

    let parts: Vec<&str> = field_name.split("__").collect();
    let prefix = format!("__{}", parts[..parts.len() - 1].join("__"));
    let field = parts[parts.len() - 1];

    let target = prefixes.get(&prefix).map(|rp| rp.table.as_str());
    let declared = target
        .and_then(|t| schema.get(t))
        .is_some_and(|t| t.has_column(field));
    if declared {
        format!("{prefix}.{field}")
    } else {
        format!("{prefix}.autoscope_objectfields->>{field}")
    }
}

/// Rewrites every leaf of a formula with [`field_transform`], attaching
/// numeric casts where a sidecar accessor is compared against a number.
pub fn formula_transform(
    schema: &Schema,
    prefixes: &Prefixes,
    formula: Formula,
    table_name: &str,
) -> Formula {
    formula.map_leaves(&mut |leaf| match leaf {
        Formula::Value(mut vs) => {
            vs.attr = field_transform(schema, prefixes, &vs.attr, table_name);
            if vs.cast.is_none() && vs.attr.contains("->>") {
                vs.cast = numeric_cast(&vs.value);
            }
            Formula::Value(vs)
        }
        Formula::Attr(mut attr) => {
            attr.attr_a = field_transform(schema, prefixes, &attr.attr_a, table_name);
            attr.attr_b = field_transform(schema, prefixes, &attr.attr_b, table_name);
            // `->>` yields text; relational comparisons are id-like.
            if attr.cast_a.is_none() && attr.attr_a.contains("->>") {
                attr.cast_a = Some("int".to_string());
            }
            if attr.cast_b.is_none() && attr.attr_b.contains("->>") {
                attr.cast_b = Some("int".to_string());
            }
            Formula::Attr(attr)
        }
        other => other,
    })
}

fn numeric_cast(value: &Value) -> Option<String> {
    match value {
        Value::I64(_) => Some("int".to_string()),
        Value::F64(_) => Some("float8".to_string()),
        _ => None,
    }
}

/// Splits insert/update data into declared-column pairs and the sidecar
/// payload, preserving input order for the declared side.
pub fn partition_columns(
    schema: &Schema,
    table: &str,
    data: &IndexMap<String, Value>,
) -> (Vec<(String, Value)>, serde_json::Map<String, serde_json::Value>) {
    let mut columns = Vec::new();
    let mut sidecar = serde_json::Map::new();
    for (key, value) in data {
        let declared = schema.get(table).is_some_and(|t| t.has_column(key));
        if declared {
            columns.push((key.clone(), value.clone()));
        } else {
            sidecar.insert(key.clone(), value.to_json());
        }
    }
    (columns, sidecar)
}

/// Builds the `SELECT __root.* FROM … LEFT JOIN … WHERE …` statement.
pub fn plan_select(
    schema: &Schema,
    prefixes: &Prefixes,
    query: &SelectQuery,
    table_prefix: &str,
) -> Result<PlannedQuery> {
    let (table, selection) = redirect(schema, &query.table, query.selection.clone());

    let transformed = formula_transform(schema, prefixes, selection, &table);
    let part = lower(&transformed)?;
    let where_sql = question_to_positional(&replace_identifiers(&part.sql, &part.idents), 1);

    let mut sql = format!(
        "SELECT {root}.* FROM {table} {root}\n",
        root = escape_ident("__root"),
        table = escape_ident(&physical_table(table_prefix, &table)),
    );
    sql.push_str(&join_clause(schema, prefixes, table_prefix));
    sql.push_str("WHERE ");
    sql.push_str(&where_sql);

    Ok(PlannedQuery {
        sql,
        args: part.args,
    })
}

/// Emits one `LEFT JOIN` per discovered prefix, shortest first so each
/// join's dependencies are already in scope.
fn join_clause(schema: &Schema, prefixes: &Prefixes, table_prefix: &str) -> String {
    let mut sorted: Vec<&String> = prefixes.keys().collect();
    sorted.sort_by_key(|prefix| (prefix.len(), prefix.as_str()));

    let mut unassigned: HashSet<&str> = HashSet::new();
    let mut out = String::new();

    for prefix in sorted {
        let path = &prefixes[prefix];

        let mut join_table = path.table.as_str();
        if !schema.contains_key(join_table) {
            join_table = UNASSIGNED_TABLE;
            unassigned.insert(prefix.as_str());
        }

        // When the source side is itself unassigned, or the linking field
        // is undeclared, the join key comes out of the sidecar as text.
        let from_declared = !unassigned.contains(path.from_table_prefix.as_str())
            && schema
                .get(&path.from_table)
                .is_some_and(|t| t.has_column(&path.from_field));
        let from_expr = if from_declared {
            quote_expr(&format!("{}.{}", path.from_table_prefix, path.from_field))
        } else {
            format!(
                "({})::int",
                quote_expr(&format!(
                    "{}.autoscope_objectfields->>{}",
                    path.from_table_prefix, path.from_field
                ))
            )
        };

        out.push_str(&format!(
            "LEFT JOIN {} {} ON {} = {}.{}\n",
            escape_ident(&physical_table(table_prefix, join_table)),
            escape_ident(prefix),
            from_expr,
            escape_ident(prefix),
            escape_ident("id"),
        ));
    }

    out
}

/// Builds the `INSERT … RETURNING id` statement, applying the unassigned
/// redirect and routing undeclared fields into the sidecar.
pub fn plan_insert(
    schema: &Schema,
    query: &InsertQuery,
    table_prefix: &str,
) -> Result<PlannedQuery> {
    let logical = query.table.to_lowercase();
    let (table, data) = if schema.contains_key(&logical) {
        (logical, query.data.clone())
    } else {
        let mut data = query.data.clone();
        data.insert("table_name".to_string(), Value::String(logical));
        (UNASSIGNED_TABLE.to_string(), data)
    };

    let (columns, sidecar) = partition_columns(schema, &table, &data);

    let mut names: Vec<String> = columns.iter().map(|(name, _)| escape_ident(name)).collect();
    let mut args: Vec<Value> = columns.into_iter().map(|(_, value)| value).collect();
    if !sidecar.is_empty() {
        names.push(escape_ident("autoscope_objectfields"));
        args.push(Value::Json(serde_json::Value::Object(sidecar)));
    }

    let physical = escape_ident(&physical_table(table_prefix, &table));
    let sql = if names.is_empty() {
        format!("INSERT INTO {physical} DEFAULT VALUES RETURNING {}", escape_ident("id"))
    } else {
        let placeholders: Vec<String> = (1..=args.len()).map(|i| format!("${i}")).collect();
        format!(
            "INSERT INTO {physical} ({}) VALUES ({}) RETURNING {}",
            names.join(", "),
            placeholders.join(", "),
            escape_ident("id"),
        )
    };

    Ok(PlannedQuery { sql, args })
}

/// Builds the `UPDATE … SET … WHERE …` statement from pre-partitioned
/// parts. The caller resolves the table redirect and, when sidecar keys
/// change, supplies the merged sidecar document (read-modify-write).
pub fn plan_update_parts(
    schema: &Schema,
    prefixes: &Prefixes,
    table: &str,
    selection: Formula,
    columns: &[(String, Value)],
    sidecar: Option<serde_json::Value>,
    table_prefix: &str,
) -> Result<PlannedQuery> {
    let mut assignments = Vec::new();
    let mut args = Vec::new();
    for (name, value) in columns {
        args.push(value.clone());
        assignments.push(format!("{} = ${}", escape_ident(name), args.len()));
    }
    if let Some(sidecar) = sidecar {
        args.push(Value::Json(sidecar));
        assignments.push(format!(
            "{} = ${}",
            escape_ident("autoscope_objectfields"),
            args.len()
        ));
    }
    if assignments.is_empty() {
        return Err(Error::invalid_predicate("update carries no data"));
    }

    let transformed = formula_transform(schema, prefixes, selection, table);
    let part = lower(&transformed)?;
    let where_sql = question_to_positional(
        &replace_identifiers(&part.sql, &part.idents),
        args.len() + 1,
    );
    args.extend(part.args);

    let sql = format!(
        "UPDATE {} AS {} SET {} WHERE {}",
        escape_ident(&physical_table(table_prefix, table)),
        escape_ident("__root"),
        assignments.join(", "),
        where_sql,
    );

    Ok(PlannedQuery { sql, args })
}

/// Builds the `DELETE FROM … WHERE …` statement.
pub fn plan_delete(
    schema: &Schema,
    prefixes: &Prefixes,
    query: &DeleteQuery,
    table_prefix: &str,
) -> Result<PlannedQuery> {
    let (table, selection) = redirect(schema, &query.table, query.selection.clone());

    let transformed = formula_transform(schema, prefixes, selection, &table);
    let part = lower(&transformed)?;
    let where_sql = question_to_positional(&replace_identifiers(&part.sql, &part.idents), 1);

    let sql = format!(
        "DELETE FROM {} AS {} WHERE {}",
        escape_ident(&physical_table(table_prefix, &table)),
        escape_ident("__root"),
        where_sql,
    );

    Ok(PlannedQuery {
        sql,
        args: part.args,
    })
}
