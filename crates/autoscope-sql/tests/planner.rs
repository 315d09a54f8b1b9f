use autoscope_core::{
    driver::{Prefixes, RelationPath},
    schema::{base_columns, Schema, Table},
    stmt::{AttrSelection, Formula, InsertQuery, SelectQuery, Value},
};
use autoscope_sql::{
    field_transform, formula_transform, partition_columns, plan_insert, plan_select, redirect,
};
use indexmap::IndexMap;

fn rtest_table(name: &str) -> Table {
    base_columns(Table::new(name))
        .with_column("a", "bigint")
        .with_column("b", "bigint")
        .created()
}

fn rtest_schema() -> Schema {
    let mut schema = Schema::new();
    for name in ["rtest_1", "rtest_2", "rtest_3"] {
        schema.insert(name.to_string(), rtest_table(name));
    }
    schema.insert(
        "autoscope_unassigned".to_string(),
        base_columns(Table::new("autoscope_unassigned"))
            .with_column("table_name", "varchar(64)")
            .created(),
    );
    schema
}

fn path(table: &str, from_table: &str, from_prefix: &str, from_field: &str) -> RelationPath {
    RelationPath {
        table: table.to_string(),
        from_table: from_table.to_string(),
        from_table_prefix: from_prefix.to_string(),
        from_field: from_field.to_string(),
    }
}

#[test]
fn field_transform_covers_all_storage_combinations() {
    let schema = rtest_schema();
    let prefixes = Prefixes::new();

    // Table exists, column declared.
    assert_eq!(
        field_transform(&schema, &prefixes, "a", "rtest_1"),
        "__root.a"
    );

    // Table exists, column in the sidecar.
    assert_eq!(
        field_transform(&schema, &prefixes, "c", "rtest_1"),
        "__root.autoscope_objectfields->>c"
    );

    // Table does not exist.
    assert_eq!(
        field_transform(&schema, &prefixes, "a", "rtest_uncreated"),
        "__root.autoscope_objectfields->>a"
    );
}

#[test]
fn field_transform_resolves_prefixes() {
    let schema = rtest_schema();
    let mut prefixes = Prefixes::new();
    prefixes.insert(
        "__a".to_string(),
        path("rtest_2", "rtest_1", "__root", "a"),
    );
    prefixes.insert(
        "__c".to_string(),
        path("rtest_uncreated", "rtest_1", "__root", "c"),
    );

    // Leaf table's column is declared.
    assert_eq!(
        field_transform(&schema, &prefixes, "a__b", "rtest_1"),
        "__a.b"
    );

    // Leaf table does not exist: route through the sidecar.
    assert_eq!(
        field_transform(&schema, &prefixes, "c__dne", "rtest_1"),
        "__c.autoscope_objectfields->>dne"
    );
}

#[test]
fn attr_sides_on_sidecar_accessors_are_cast_to_int() {
    let schema = rtest_schema();
    let mut prefixes = Prefixes::new();
    prefixes.insert(
        "__c".to_string(),
        path("rtest_uncreated", "rtest_1", "__root", "c"),
    );

    let formula = Formula::Attr(AttrSelection::new("c__dne", "=", "a"));
    let Formula::Attr(attr) = formula_transform(&schema, &prefixes, formula, "rtest_1") else {
        panic!("leaf shape changed");
    };
    assert_eq!(attr.cast_a.as_deref(), Some("int"));
    assert_eq!(attr.cast_b, None);
}

#[test]
fn select_plan_with_single_join() {
    let schema = rtest_schema();
    let mut prefixes = Prefixes::new();
    prefixes.insert(
        "__a".to_string(),
        path("rtest_2", "rtest_1", "__root", "a"),
    );

    let query = SelectQuery {
        table: "rtest_1".to_string(),
        selection: Formula::Attr(AttrSelection::new("a__a", "=", "b")),
    };

    let planned = plan_select(&schema, &prefixes, &query, "").unwrap();
    assert_eq!(
        planned.sql,
        "SELECT \"__root\".* FROM \"rtest_1\" \"__root\"\n\
         LEFT JOIN \"rtest_2\" \"__a\" ON \"__root\".\"a\" = \"__a\".\"id\"\n\
         WHERE \"__a\".\"a\" = \"__root\".\"b\""
    );
    assert!(planned.args.is_empty());
}

#[test]
fn joins_emit_shortest_prefix_first() {
    let schema = rtest_schema();
    let mut prefixes = Prefixes::new();
    prefixes.insert(
        "__a__b".to_string(),
        path("rtest_3", "rtest_2", "__a", "b"),
    );
    prefixes.insert(
        "__a".to_string(),
        path("rtest_2", "rtest_1", "__root", "a"),
    );

    let query = SelectQuery {
        table: "rtest_1".to_string(),
        selection: Formula::Attr(AttrSelection::new("a__b__a", "=", "b")),
    };

    let planned = plan_select(&schema, &prefixes, &query, "").unwrap();
    let first_join = planned.sql.find("LEFT JOIN \"rtest_2\" \"__a\"").unwrap();
    let second_join = planned.sql.find("LEFT JOIN \"rtest_3\" \"__a__b\"").unwrap();
    assert!(first_join < second_join);
}

#[test]
fn join_against_uncreated_table_uses_unassigned_and_sidecar_key() {
    let schema = rtest_schema();
    let mut prefixes = Prefixes::new();
    prefixes.insert(
        "__c".to_string(),
        path("rtest_uncreated", "rtest_2", "__root", "c"),
    );

    let query = SelectQuery {
        table: "rtest_2".to_string(),
        selection: Formula::Attr(AttrSelection::new("c__dne_a", "=", "a")),
    };

    let planned = plan_select(&schema, &prefixes, &query, "").unwrap();
    assert!(planned.sql.contains(
        "LEFT JOIN \"autoscope_unassigned\" \"__c\" ON \
         (\"__root\".\"autoscope_objectfields\" ->> 'c')::int = \"__c\".\"id\""
    ));
}

#[test]
fn redirect_appends_table_name_discriminator() {
    let schema = rtest_schema();

    let (table, _) = redirect(&schema, "rtest_1", Formula::Tautology);
    assert_eq!(table, "rtest_1");

    let (table, selection) = redirect(&schema, "rtest_uncreated", Formula::eq("a", 1));
    assert_eq!(table, "autoscope_unassigned");
    assert_eq!(
        selection,
        Formula::and(
            Formula::eq("a", 1),
            Formula::eq("table_name", "rtest_uncreated")
        )
    );
}

#[test]
fn select_on_missing_table_targets_unassigned() {
    let schema = rtest_schema();
    let query = SelectQuery {
        table: "rtest_uncreated".to_string(),
        selection: Formula::eq("b", 1),
    };

    let planned = plan_select(&schema, &Prefixes::new(), &query, "").unwrap();
    assert!(planned
        .sql
        .starts_with("SELECT \"__root\".* FROM \"autoscope_unassigned\" \"__root\""));
    // Undeclared field routed through the sidecar with a numeric cast, the
    // discriminator against the declared table_name column.
    assert!(planned
        .sql
        .contains("(\"__root\".\"autoscope_objectfields\" ->> 'b')::int = $1"));
    assert!(planned.sql.contains("\"__root\".\"table_name\" = $2"));
    assert_eq!(
        planned.args,
        vec![Value::I64(1), Value::from("rtest_uncreated")]
    );
}

#[test]
fn insert_partitions_declared_and_sidecar_fields() {
    let schema = rtest_schema();
    let mut data = IndexMap::new();
    data.insert("a".to_string(), Value::I64(1));
    data.insert("nickname".to_string(), Value::from("shed"));

    let planned = plan_insert(&schema, &InsertQuery::new("rtest_1", data), "").unwrap();
    assert_eq!(
        planned.sql,
        "INSERT INTO \"rtest_1\" (\"a\", \"autoscope_objectfields\") \
         VALUES ($1, $2) RETURNING \"id\""
    );
    assert_eq!(planned.args[0], Value::I64(1));
    assert_eq!(
        planned.args[1],
        Value::Json(serde_json::json!({"nickname": "shed"}))
    );
}

#[test]
fn insert_into_missing_table_spills_to_unassigned() {
    let schema = rtest_schema();
    let mut data = IndexMap::new();
    data.insert("strcol".to_string(), Value::from("strval0"));

    let planned = plan_insert(&schema, &InsertQuery::new("test_table0", data), "").unwrap();
    assert_eq!(
        planned.sql,
        "INSERT INTO \"autoscope_unassigned\" (\"table_name\", \"autoscope_objectfields\") \
         VALUES ($1, $2) RETURNING \"id\""
    );
    assert_eq!(planned.args[0], Value::from("test_table0"));
    assert_eq!(
        planned.args[1],
        Value::Json(serde_json::json!({"strcol": "strval0"}))
    );
}

#[test]
fn physical_prefix_applies_to_tables_not_aliases() {
    let schema = rtest_schema();
    let query = SelectQuery {
        table: "rtest_1".to_string(),
        selection: Formula::eq("a", 1),
    };

    let planned = plan_select(&schema, &Prefixes::new(), &query, "app_").unwrap();
    assert!(planned
        .sql
        .starts_with("SELECT \"__root\".* FROM \"app_rtest_1\" \"__root\""));
}

#[test]
fn partition_preserves_declared_order() {
    let schema = rtest_schema();
    let mut data = IndexMap::new();
    data.insert("b".to_string(), Value::I64(2));
    data.insert("x".to_string(), Value::I64(9));
    data.insert("a".to_string(), Value::I64(1));

    let (columns, sidecar) = partition_columns(&schema, "rtest_1", &data);
    let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(sidecar.get("x"), Some(&serde_json::json!(9)));
}
