//! Mapped types and a recording connection shared by the integration tests.

#![allow(dead_code)]

use sqlgraph::prelude::*;
use sqlgraph::{BoxCursor, DriverError, ReferentialAction, RowCursor};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct TestPoco {
    pub id: i64,
    pub name: String,
    pub decimal: f64,
}

impl Entity for TestPoco {
    const TABLE_NAME: &'static str = "TestPoco";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |p| &p.id, |p| &mut p.id);
        m.column("Name", |p| &p.name, |p| &mut p.name);
        m.column("Decimal", |p| &p.decimal, |p| &mut p.decimal);
    }
}

#[derive(Debug, Default)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub created: Option<String>,
    pub orders: LazyCollection<Order>,
}

impl Entity for Customer {
    const TABLE_NAME: &'static str = "Customer";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |c| &c.id, |c| &mut c.id).automatic();
        m.column("Name", |c| &c.name, |c| &mut c.name)
            .max_length(120)
            .index("IX_Customer_Name");
        m.column("Created", |c| &c.created, |c| &mut c.created)
            .readonly();
        m.collection("Orders", "Customer", |c| &mut c.orders);
    }
}

#[derive(Debug, Default)]
pub struct Order {
    pub id: i64,
    pub number: String,
    pub total: f64,
    pub customer: Option<Ref<Customer>>,
}

impl Entity for Order {
    const TABLE_NAME: &'static str = "Order";
    const SCHEMA: Option<&'static str> = Some("sales");

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |o| &o.id, |o| &mut o.id).automatic();
        m.column("Number", |o| &o.number, |o| &mut o.number)
            .column_name("OrderNumber");
        m.column("Total", |o| &o.total, |o| &mut o.total);
        m.reference("Customer", |o| &o.customer, |o| &mut o.customer)
            .on_delete(ReferentialAction::Cascade);
    }
}

/// Self-referencing: an employee reports to a manager.
#[derive(Debug, Default)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub manager: Option<Ref<Employee>>,
}

impl Entity for Employee {
    const TABLE_NAME: &'static str = "Employee";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |e| &e.id, |e| &mut e.id);
        m.column("Name", |e| &e.name, |e| &mut e.name);
        m.reference("Manager", |e| &e.manager, |e| &mut e.manager);
    }
}

pub fn mapper() -> Arc<Mapper> {
    let mut mapper = Mapper::new();
    mapper
        .register::<TestPoco>()
        .expect("register TestPoco")
        .register::<Customer>()
        .expect("register Customer")
        .register::<Order>()
        .expect("register Order")
        .register::<Employee>()
        .expect("register Employee");
    Arc::new(mapper)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn row(values: Vec<Value>) -> Row {
    Row::from_values(values)
}

/// Records every statement and answers queries from a FIFO script.
#[derive(Default)]
pub struct Recording {
    script: Mutex<VecDeque<Vec<Row>>>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
    fail_on: Vec<String>,
}

impl Recording {
    pub fn new(script: Vec<Vec<Row>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Fail every statement whose text contains `needle`. Repeatable.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .expect("log lock")
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.log.lock().expect("log lock")[index].1.clone()
    }

    fn record(&self, sql: &str, params: &[Value]) -> sqlgraph::Result<()> {
        self.log
            .lock()
            .expect("log lock")
            .push((sql.to_string(), params.to_vec()));
        if self.fail_on.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(Error::Driver(
                DriverError::new("constraint violation").with_sql(sql),
            ));
        }
        Ok(())
    }
}

impl Connection for Recording {
    fn query(&self, sql: &str, params: &[Value]) -> sqlgraph::Result<BoxCursor> {
        self.record(sql, params)?;
        let rows = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(RowCursor::new(rows)))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> sqlgraph::Result<u64> {
        self.record(sql, params)?;
        Ok(1)
    }

    fn begin_transaction(&self) -> sqlgraph::Result<()> {
        self.record("BEGIN", &[])
    }

    fn commit_transaction(&self) -> sqlgraph::Result<()> {
        self.record("COMMIT", &[])
    }

    fn rollback_transaction(&self) -> sqlgraph::Result<()> {
        self.record("ROLLBACK", &[])
    }
}

pub fn session(script: Vec<Vec<Row>>) -> Session<Recording> {
    Session::new(Recording::new(script), mapper())
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}
