//! Exact SQL text and parameter order produced by the builders.

mod common;

use common::{Customer, Order, TestPoco, mapper, row, session, text};
use sqlgraph::prelude::*;
use sqlgraph::state::Start;
use sqlgraph::ParamSlot;

fn values(slots: &[ParamSlot]) -> Vec<Value> {
    slots
        .iter()
        .map(|slot| match slot {
            ParamSlot::Value(v) => v.clone(),
            ParamSlot::Arg(n) => panic!("unexpected argument slot {n}"),
        })
        .collect()
}

#[test]
fn where_on_name_compiles_to_single_parameter() {
    let session = session(Vec::new());
    let compiled = session
        .select::<TestPoco>()
        .unwrap()
        .select_all()
        .from()
        .where_(Expr::col("Name").eq("Toto"))
        .unwrap()
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT \"t\".\"Id\", \"t\".\"Name\", \"t\".\"Decimal\" FROM \"TestPoco\" AS t WHERE( \"t\".\"Name\"= @Item0)"
    );
    assert_eq!(values(compiled.parameters()), vec![text("Toto")]);
}

#[test]
fn plain_select_has_no_parameters() {
    let session = session(Vec::new());
    let compiled = session.queryable::<TestPoco>().compile().unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT \"t\".\"Id\", \"t\".\"Name\", \"t\".\"Decimal\" FROM \"TestPoco\" AS t"
    );
    assert!(compiled.parameters().is_empty());
}

#[test]
fn paging_binds_offset_and_count_in_every_dialect() {
    for (dialect, tail) in [
        (Dialect::Generic, "LIMIT @Item0, @Item1"),
        (Dialect::MySql, "LIMIT @Item0, @Item1"),
        (Dialect::Sqlite, "LIMIT @Item0, @Item1"),
        (Dialect::Postgres, "OFFSET @Item0 LIMIT @Item1"),
    ] {
        let session = Session::builder(common::Recording::default(), mapper())
            .dialect(dialect)
            .build();
        let compiled = session
            .queryable::<TestPoco>()
            .order_by("Name")
            .skip(10)
            .take(15)
            .compile()
            .unwrap();
        assert!(compiled.sql().contains("ORDER BY"), "{dialect:?}");
        assert!(compiled.sql().ends_with(tail), "{dialect:?}: {}", compiled.sql());
        assert_eq!(
            values(compiled.parameters()),
            vec![Value::Int(10), Value::Int(15)]
        );
    }
}

#[test]
fn count_reads_driver_converted_integer() {
    let mut session = session(vec![vec![row(vec![Value::Int(42)])]]);
    let query = session.queryable::<TestPoco>();
    assert_eq!(
        query.compile_count().unwrap().sql(),
        "SELECT COUNT(*) FROM \"TestPoco\" AS t0"
    );
    assert_eq!(query.count(&mut session).unwrap(), 42);
}

#[test]
fn literal_count_matches_bound_parameters() {
    let session = session(Vec::new());
    let shapes = vec![
        Expr::col("Decimal").lt(Expr::null()),
        Expr::col("Name").eq(Expr::null()),
        Expr::null().ne(Expr::col("Name")),
        Expr::null().eq(Expr::null()),
        Expr::col("Id").in_list(vec![Expr::lit(1), Expr::null()]),
        Expr::lit(4).not_in_list(Vec::<Expr>::new()),
        Expr::col("Decimal").mul(2.0).gt(Expr::col("Id").add(1)).not(),
        Expr::col("Name").like("a%").or(Expr::col("Id").eq(Expr::param(0))),
    ];
    for predicate in shapes {
        let expected = predicate.literal_count();
        let query = session
            .select::<TestPoco>()
            .unwrap()
            .column("Id")
            .unwrap()
            .from()
            .where_(predicate)
            .unwrap();
        assert_eq!(expected, Some(query.params().len()), "{}", query.sql());
    }

    let exists = Expr::exists(|q: Query<Order, Start>| {
        q.values(1)?.from().where_(Expr::col("Total").gt(10.0))
    });
    assert_eq!(exists.literal_count(), None);
}

#[test]
fn parameters_follow_literal_order() {
    let predicate = Expr::col("Name")
        .eq("a")
        .and(Expr::col("Decimal").gt(1.5).or(Expr::col("Id").in_list(vec![1, 2])));
    let literals = predicate.literal_count();
    let session = session(Vec::new());
    let query = session
        .select::<TestPoco>()
        .unwrap()
        .column("Id")
        .unwrap()
        .from()
        .where_(predicate)
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"t\".\"Id\" FROM \"TestPoco\" AS t WHERE(( \"t\".\"Name\"= @Item0) AND(( \"t\".\"Decimal\"> @Item1) OR( \"t\".\"Id\" IN( @Item2, @Item3))))"
    );
    assert_eq!(Some(query.params().len()), literals);
    assert_eq!(
        values(query.params()),
        vec![text("a"), Value::Double(1.5), Value::Int(1), Value::Int(2)]
    );
}

#[test]
fn not_and_grouped_or() {
    let session = session(Vec::new());
    let query = session
        .select::<TestPoco>()
        .unwrap()
        .column("Id")
        .unwrap()
        .from()
        .where_(Expr::col("Name").eq("x").not())
        .unwrap()
        .or_where_sub(|q| {
            q.and_where(Expr::col("Id").gt(1))?
                .and_where(Expr::col("Id").lt(9))
        })
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"t\".\"Id\" FROM \"TestPoco\" AS t WHERE NOT( \"t\".\"Name\"= @Item0) OR(( \"t\".\"Id\"> @Item1) AND( \"t\".\"Id\"< @Item2))"
    );
}

#[test]
fn schema_and_column_overrides_are_honored() {
    let session = session(Vec::new());
    let query = session.select_all_from::<Order>(&["Customer"]).unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"t\".\"Id\", \"t\".\"OrderNumber\", \"t\".\"Total\", \"t\".\"Customer\", \"t1\".\"Id\", \"t1\".\"Name\", \"t1\".\"Created\" FROM \"sales\".\"Order\" AS t LEFT JOIN \"Customer\" AS t1 ON( \"t\".\"Customer\"= \"t1\".\"Id\")"
    );
}

#[test]
fn mysql_quotes_with_backticks() {
    let session = Session::builder(common::Recording::default(), mapper())
        .dialect(Dialect::MySql)
        .build();
    let compiled = session
        .select::<TestPoco>()
        .unwrap()
        .column("Name")
        .unwrap()
        .from()
        .compile()
        .unwrap();
    assert_eq!(compiled.sql(), "SELECT `t`.`Name` FROM `TestPoco` AS t");
}

#[test]
fn aggregate_with_group_by() {
    let session = session(Vec::new());
    let compiled = session
        .select::<Order>()
        .unwrap()
        .values(Expr::col("Customer").key())
        .unwrap()
        .values(Expr::col("Total").sum())
        .unwrap()
        .from()
        .group_by("Customer")
        .unwrap()
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT \"t\".\"Customer\", SUM( \"t\".\"Total\") FROM \"sales\".\"Order\" AS t GROUP BY \"t\".\"Customer\""
    );
    assert!(compiled.plan().is_none());
}

#[test]
fn not_exists_subquery_sees_outer_alias() {
    let session = session(Vec::new());
    let query = session
        .select::<Customer>()
        .unwrap()
        .select_all()
        .from()
        .where_not_exists(|q: Query<Order, Start>| {
            q.values(1)?
                .from()
                .where_(Expr::col("Customer").key().eq(Expr::id_of("t")))
        })
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"t\".\"Id\", \"t\".\"Name\", \"t\".\"Created\" FROM \"Customer\" AS t WHERE NOT EXISTS(SELECT @Item0 FROM \"sales\".\"Order\" AS t1 WHERE( \"t1\".\"Customer\"= \"t\".\"Id\"))"
    );
    assert_eq!(values(query.params()), vec![Value::Int(1)]);
}

#[test]
fn insert_skips_generated_and_readonly_columns() {
    let session = session(Vec::new());
    let customer = Ref::new(Customer {
        id: 3,
        name: "Ann".to_string(),
        ..Customer::default()
    });
    let order = Ref::new(Order {
        number: "A-1".to_string(),
        total: 9.5,
        customer: Some(customer.clone()),
        ..Order::default()
    });
    let compiled = session
        .insert_into::<Order>()
        .unwrap()
        .values_of(&order)
        .unwrap()
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql(),
        "INSERT INTO \"sales\".\"Order\" (\"OrderNumber\", \"Total\", \"Customer\") VALUES( @Item0, @Item1, @Item2)"
    );
    assert_eq!(
        values(compiled.parameters()),
        vec![text("A-1"), Value::Double(9.5), Value::BigInt(3)]
    );

    let compiled = session
        .insert_into::<Customer>()
        .unwrap()
        .values_of(&customer)
        .unwrap()
        .compile()
        .unwrap();
    assert_eq!(
        compiled.sql(),
        "INSERT INTO \"Customer\" (\"Name\") VALUES( @Item0)"
    );
}

#[test]
fn unmapped_member_fails_at_translation() {
    let session = session(Vec::new());
    let err = session
        .select::<TestPoco>()
        .unwrap()
        .select_all()
        .from()
        .where_(Expr::col("Nope").eq(1))
        .unwrap_err();
    assert!(err.is_programmer_error());
    assert!(session.connection().statements().is_empty());
}

#[test]
fn last_inserted_id_follows_dialect() {
    for (dialect, sql) in [
        (Dialect::Generic, "SELECT last_insert_id()"),
        (Dialect::Sqlite, "SELECT last_insert_rowid()"),
        (Dialect::Postgres, "SELECT lastval()"),
    ] {
        let session = Session::builder(common::Recording::default(), mapper())
            .dialect(dialect)
            .build();
        let compiled = session
            .select::<Customer>()
            .unwrap()
            .values(Expr::last_inserted_id())
            .unwrap()
            .compile()
            .unwrap();
        assert_eq!(compiled.sql(), sql);
    }
}

#[test]
fn configured_session_writes_its_dialect_and_schema() {
    let json = serde_json::json!({
        "dialect": "postgres",
        "default_schema": "crm",
    })
    .to_string();
    let config = SessionConfig::from_json(&json).unwrap();
    let session = Session::builder(common::Recording::default(), mapper())
        .config(config)
        .build();

    let customers = session
        .select::<Customer>()
        .unwrap()
        .column("Name")
        .unwrap()
        .from()
        .compile()
        .unwrap();
    assert_eq!(customers.sql(), "SELECT \"t\".\"Name\" FROM \"crm\".\"Customer\" AS t");

    let orders = session
        .queryable::<Order>()
        .take(5)
        .compile()
        .unwrap();
    assert_eq!(
        orders.sql(),
        "SELECT \"t\".\"Id\", \"t\".\"OrderNumber\", \"t\".\"Total\", \"t\".\"Customer\" FROM \"sales\".\"Order\" AS t LIMIT @Item0"
    );
}

#[test]
fn arithmetic_aggregates_and_named_joins() {
    let session = session(Vec::new());
    let query = session
        .select::<Order>()
        .unwrap()
        .values(Expr::col("Total").avg())
        .unwrap()
        .values(Expr::count_star())
        .unwrap()
        .from()
        .left_join::<Customer>("c", Expr::member("c", "Id").eq(Expr::col("Customer").key()))
        .unwrap()
        .where_(Expr::col("Total").mul(2).div(Expr::col("Id")).ge(1.5))
        .unwrap()
        .and_where(Expr::col("Total").le(100))
        .unwrap()
        .and_where(Expr::col("Id").not_in_list(vec![4, 5]))
        .unwrap()
        .order_by("Total")
        .unwrap()
        .then_by_desc("Id")
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT AVG( \"t\".\"Total\"), COUNT(*) FROM \"sales\".\"Order\" AS t LEFT JOIN \"Customer\" AS t1 ON( \"t1\".\"Id\"= \"t\".\"Customer\") WHERE((( \"t\".\"Total\"* @Item0)/ \"t\".\"Id\")>= @Item1) AND( \"t\".\"Total\"<= @Item2) AND( \"t\".\"Id\" NOT IN( @Item3, @Item4)) ORDER BY  \"t\".\"Total\", \"t\".\"Id\" DESC"
    );
    assert_eq!(
        values(query.params()),
        vec![
            Value::Int(2),
            Value::Double(1.5),
            Value::Int(100),
            Value::Int(4),
            Value::Int(5),
        ]
    );
}

#[test]
fn not_exists_expression_matches_the_clause_form() {
    fn orders_of_outer(q: Query<Order, Start>) -> sqlgraph::Result<Query<Order, sqlgraph::state::Where>> {
        q.values(1)?
            .from()
            .where_(Expr::col("Customer").key().eq(Expr::id_of("t")))
    }
    let session = session(Vec::new());
    let as_expr = session
        .select::<Customer>()
        .unwrap()
        .column("Name")
        .unwrap()
        .from()
        .where_(Expr::not_exists(orders_of_outer))
        .unwrap();
    let as_clause = session
        .select::<Customer>()
        .unwrap()
        .column("Name")
        .unwrap()
        .from()
        .where_not_exists(orders_of_outer)
        .unwrap();
    assert_eq!(as_expr.sql(), as_clause.sql());
    assert!(as_expr.sql().contains("WHERE NOT EXISTS(SELECT"));
}
