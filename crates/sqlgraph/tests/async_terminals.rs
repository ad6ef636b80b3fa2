//! Async terminals driven by the asupersync runtime.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{Customer, TestPoco, row, session, text, unwrap_outcome};
use sqlgraph::prelude::*;

fn customer_row(id: i64, name: &str) -> Row {
    row(vec![Value::BigInt(id), text(name), Value::Null])
}

#[test]
fn entity_helpers_run_asynchronously() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut session = session(vec![
            vec![row(vec![Value::BigInt(11)])],
            vec![customer_row(11, "Ann")],
            Vec::new(),
        ]);
        let ann = Ref::new(Customer {
            name: "Ann".to_string(),
            ..Customer::default()
        });
        unwrap_outcome(session.save_async(&cx, &ann).await);
        assert_eq!(ann.read().id, 11);

        let loaded = unwrap_outcome(session.load_async::<Customer>(&cx, 11_i64, &[]).await);
        assert!(Ref::ptr_eq(&loaded, &ann));

        let missing = unwrap_outcome(session.get_async::<Customer>(&cx, 12_i64, &[]).await);
        assert!(missing.is_none());

        ann.write().name = "Ann B.".to_string();
        assert_eq!(unwrap_outcome(session.update_async(&cx, &ann).await), 1);
        assert_eq!(unwrap_outcome(session.delete_async(&cx, &ann).await), 1);
        assert!(!session.identity().contains::<Customer>(&Value::BigInt(11)));

        let statements = session.connection().statements();
        assert_eq!(
            statements,
            vec![
                "BEGIN",
                "INSERT INTO \"Customer\" (\"Name\") VALUES( @Item0)",
                "SELECT last_insert_id()",
                "COMMIT",
                "SELECT \"t\".\"Id\", \"t\".\"Name\", \"t\".\"Created\" FROM \"Customer\" AS t WHERE( \"t\".\"Id\"= @Item0)",
                "SELECT \"t\".\"Id\", \"t\".\"Name\", \"t\".\"Created\" FROM \"Customer\" AS t WHERE( \"t\".\"Id\"= @Item0) LIMIT @Item1",
                "UPDATE \"Customer\" SET \"Name\"= @Item0 WHERE( \"Id\"= @Item1)",
                "DELETE FROM \"Customer\" WHERE( \"Id\"= @Item0)",
            ]
        );
    });
}

#[test]
fn query_terminals_run_asynchronously() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut session = session(vec![
            vec![
                row(vec![Value::BigInt(1), text("a"), Value::Double(0.5)]),
                row(vec![Value::BigInt(2), text("b"), Value::Double(1.5)]),
            ],
            vec![row(vec![Value::BigInt(2)])],
            vec![row(vec![Value::BigInt(2), text("b"), Value::Double(1.5)])],
            Vec::new(),
        ]);
        let query = session.queryable::<TestPoco>().order_by("Id");

        let all = unwrap_outcome(query.to_list_async(&cx, &mut session).await);
        assert_eq!(all.len(), 2);
        assert_eq!(unwrap_outcome(query.count_async(&cx, &mut session).await), 2);

        let b = unwrap_outcome(
            session
                .select::<TestPoco>()
                .unwrap()
                .select_all()
                .from()
                .where_(Expr::col("Name").eq("b"))
                .unwrap()
                .single_async(&cx, &mut session)
                .await,
        );
        assert!(Ref::ptr_eq(&b, &all[1]));

        let none = unwrap_outcome(query.first_or_default_async(&cx, &mut session).await);
        assert!(none.is_none());
    });
}

#[test]
fn async_errors_come_back_as_outcome_err() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut session = session(vec![vec![customer_row(1, "a"), customer_row(2, "b")]]);
        let outcome = session
            .select::<Customer>()
            .unwrap()
            .select_all()
            .from()
            .single_async(&cx, &mut session)
            .await;
        match outcome {
            Outcome::Err(Error::Cardinality(e)) => assert_eq!(e.actual, 2),
            Outcome::Err(other) => panic!("unexpected error: {other}"),
            _ => panic!("expected a cardinality error"),
        }
    });
}

#[test]
fn prepared_terminals_run_asynchronously() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let mut session = session(vec![
            vec![customer_row(3, "c")],
            Vec::new(),
            vec![customer_row(3, "c"), customer_row(4, "c")],
        ]);
        let by_name = PreparedQuery::new(|q: QueryRoot<Customer>| {
            q.select()?
                .select_all()
                .from()
                .where_(Expr::col("Name").eq(Expr::param(0)))
        });

        let c = unwrap_outcome(by_name.first_async(&cx, &mut session, &[text("c")]).await);
        assert_eq!(c.read().id, 3);
        let none = unwrap_outcome(
            by_name
                .single_or_default_async(&cx, &mut session, &[text("x")])
                .await,
        );
        assert!(none.is_none());
        match by_name
            .single_or_default_async(&cx, &mut session, &[text("c")])
            .await
        {
            Outcome::Err(Error::Cardinality(e)) => assert_eq!(e.expected, "at most one row"),
            _ => panic!("expected a cardinality error"),
        }

        let statements = session.connection().statements();
        assert!(statements[0].ends_with("LIMIT @Item1"));
        assert_eq!(statements[1], statements[2]);
        assert!(!statements[1].contains("LIMIT"));
    });
}
