//! Mapped types and a scripted connection shared by the unit tests.

use sqlgraph_core::{
    BoxCursor, Connection, Entity, LazyCollection, Mapper, MappingBuilder, Ref, Result, Row,
    RowCursor, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

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
pub struct Author {
    pub id: i64,
    pub name: String,
    pub posts: LazyCollection<Post>,
}

impl Entity for Author {
    const TABLE_NAME: &'static str = "Author";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |a| &a.id, |a| &mut a.id).automatic();
        m.column("Name", |a| &a.name, |a| &mut a.name);
        m.collection("Posts", "Author", |a| &mut a.posts);
    }
}

#[derive(Debug, Default)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author: Option<Ref<Author>>,
}

impl Entity for Post {
    const TABLE_NAME: &'static str = "Post";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |p| &p.id, |p| &mut p.id).automatic();
        m.column("Title", |p| &p.title, |p| &mut p.title);
        m.reference("Author", |p| &p.author, |p| &mut p.author);
    }
}

/// A self-referencing type.
#[derive(Debug, Default)]
pub struct Node {
    pub id: i64,
    pub label: String,
    pub parent: Option<Ref<Node>>,
}

impl Entity for Node {
    const TABLE_NAME: &'static str = "Node";

    fn map(m: &mut MappingBuilder<Self>) {
        m.key("Id", |n| &n.id, |n| &mut n.id);
        m.column("Label", |n| &n.label, |n| &mut n.label);
        m.reference("Parent", |n| &n.parent, |n| &mut n.parent);
    }
}

pub fn mapper() -> Arc<Mapper> {
    let mut mapper = Mapper::new();
    mapper
        .register::<TestPoco>()
        .unwrap()
        .register::<Author>()
        .unwrap()
        .register::<Post>()
        .unwrap()
        .register::<Node>()
        .unwrap();
    Arc::new(mapper)
}

pub fn row(values: Vec<Value>) -> Row {
    Row::from_values(values)
}

/// Records statements and answers queries from a script.
#[derive(Default)]
pub struct Scripted {
    results: Mutex<VecDeque<Vec<Row>>>,
    pub log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Scripted {
    pub fn with_results(results: Vec<Vec<Row>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            log: Mutex::default(),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }
}

impl Connection for Scripted {
    fn query(&self, sql: &str, params: &[Value]) -> Result<BoxCursor> {
        self.record(sql, params);
        let rows = self.results.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::new(RowCursor::new(rows)))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params);
        Ok(1)
    }

    fn begin_transaction(&self) -> Result<()> {
        self.record("BEGIN", &[]);
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        self.record("COMMIT", &[]);
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        self.record("ROLLBACK", &[]);
        Ok(())
    }
}
