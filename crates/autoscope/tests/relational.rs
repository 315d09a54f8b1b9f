mod common;

use autoscope::{
    schema::{base_columns, MigrationStep, Table},
    stmt::{AttrSelection, Formula, InsertQuery, SelectQuery, Value},
    Engine,
};
use common::{data, mem_engine, PlainVerifier};

async fn create_rtest_tables(engine: &Engine) {
    let steps: Vec<MigrationStep> = ["rtest_1", "rtest_2", "rtest_3"]
        .into_iter()
        .map(|name| MigrationStep::CreateTable {
            table_name: name.to_string(),
            table: base_columns(Table::new(name))
                .with_column("a", "bigint")
                .with_column("b", "bigint"),
        })
        .collect();
    engine.perform_migration(&steps).await.unwrap();
    engine.load_schema().await.unwrap();
}

/// Builds the linked fixture: rtest_1.a references rtest_2, rtest_2.b
/// references rtest_3, and rtest_2.c references a table that was never
/// created.
async fn seed(engine: &Engine) -> i64 {
    create_rtest_tables(engine).await;
    let uid = engine
        .create_user(&PlainVerifier, "username", "password")
        .await
        .unwrap();

    let mut insert = InsertQuery::new(
        "rtest_1",
        data(&[("a", Value::I64(1)), ("b", Value::I64(42))]),
    );
    insert
        .foreign_keys
        .insert("a".to_string(), "rtest_2".to_string());
    engine.insert(uid, insert).await.unwrap();

    let mut insert = InsertQuery::new(
        "rtest_2",
        data(&[
            ("a", Value::I64(42)),
            ("b", Value::I64(1)),
            ("c", Value::I64(1)),
        ]),
    );
    insert
        .foreign_keys
        .insert("b".to_string(), "rtest_3".to_string());
    insert
        .foreign_keys
        .insert("c".to_string(), "rtest_uncreated".to_string());
    engine.insert(uid, insert).await.unwrap();

    engine
        .insert(
            uid,
            InsertQuery::new(
                "rtest_3",
                data(&[("a", Value::I64(42)), ("b", Value::I64(99))]),
            ),
        )
        .await
        .unwrap();

    uid
}

fn attr_query(table: &str, attr_a: &str, attr_b: &str) -> SelectQuery {
    SelectQuery {
        table: table.to_string(),
        selection: Formula::Attr(AttrSelection::new(attr_a, "=", attr_b)),
    }
}

#[tokio::test]
async fn single_hop_filtering() {
    let engine = mem_engine().await;
    let uid = seed(&engine).await;

    let mut rows = engine
        .select(uid, attr_query("rtest_1", "a__a", "b"))
        .await
        .unwrap();
    assert!(rows.next(), "no rows retrieved");
    let row = rows.get().unwrap();
    assert_eq!(row["a"], Value::I64(1));
    assert_eq!(row["b"], Value::I64(42));
    assert!(!rows.next());
}

#[tokio::test]
async fn two_hop_filtering() {
    let engine = mem_engine().await;
    let uid = seed(&engine).await;

    let mut rows = engine
        .select(uid, attr_query("rtest_1", "a__b__a", "b"))
        .await
        .unwrap();
    assert!(rows.next(), "no rows retrieved");
    let row = rows.get().unwrap();
    assert_eq!(row["a"], Value::I64(1));
    assert_eq!(row["b"], Value::I64(42));
}

#[tokio::test]
async fn hop_into_an_uncreated_table() {
    let engine = mem_engine().await;
    let uid = seed(&engine).await;

    // Park a row for the uncreated table; its id is the link target of
    // rtest_2.c.
    engine
        .insert(
            uid,
            InsertQuery::new(
                "rtest_uncreated",
                data(&[("dne_a", Value::I64(42)), ("b", Value::I64(1))]),
            ),
        )
        .await
        .unwrap();

    let mut rows = engine
        .select(uid, attr_query("rtest_2", "c__dne_a", "a"))
        .await
        .unwrap();
    assert!(rows.next(), "no rows retrieved");
    let row = rows.get().unwrap();
    assert_eq!(row["a"], Value::I64(42));
    assert_eq!(row["b"], Value::I64(1));
    assert_eq!(row["c"], Value::I64(1));
}

#[tokio::test]
async fn hop_out_of_an_uncreated_table() {
    let engine = mem_engine().await;
    let uid = seed(&engine).await;

    let mut insert = InsertQuery::new(
        "rtest_uncreated",
        data(&[("dne_a", Value::I64(42)), ("b", Value::I64(1))]),
    );
    insert
        .foreign_keys
        .insert("b".to_string(), "rtest_3".to_string());
    engine.insert(uid, insert).await.unwrap();

    let mut rows = engine
        .select(uid, attr_query("rtest_uncreated", "b__a", "dne_a"))
        .await
        .unwrap();
    assert!(rows.next(), "no rows retrieved");
    let row = rows.get().unwrap();
    assert_eq!(row["b"], Value::I64(1));
    assert_eq!(row["dne_a"], Value::I64(42));
}

#[tokio::test]
async fn unmatched_relational_filter_returns_nothing() {
    let engine = mem_engine().await;
    let uid = seed(&engine).await;

    // rtest_2 rows where the referenced rtest_3 row's b equals our a:
    // 99 != 42, so nothing comes back.
    let mut rows = engine
        .select(uid, attr_query("rtest_2", "b__b", "a"))
        .await
        .unwrap();
    assert!(!rows.next());
}
