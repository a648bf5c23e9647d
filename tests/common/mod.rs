// Shared fixture: a three-level X -> Y -> Z graph, its table mappings and
// its merge configuration.
#![allow(dead_code)]

use rustmemomap::core::{integer_at, text_at};
use rustmemomap::{
    CollectionVisitor, Column, ContextOptions, DataType, DbContext, Entity, EntityMap,
    InMemoryDB, InstanceTag, Mapper, MapperConfig, MergePolicy, MergeScope, Result, Row, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct X {
    pub id: i64,
    pub name: String,
    pub y_list: Vec<Y>,
    pub uid: InstanceTag,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Y {
    pub id: i64,
    pub x_id: i64,
    pub name: String,
    pub z_list: Vec<Z>,
    pub uid: InstanceTag,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Z {
    pub id: i64,
    pub y_id: i64,
    pub name: String,
    pub uid: InstanceTag,
}

impl X {
    pub fn new(name: &str, y_list: Vec<Y>) -> Self {
        Self {
            name: name.to_string(),
            y_list,
            ..Default::default()
        }
    }
}

impl Y {
    pub fn new(name: &str, z_list: Vec<Z>) -> Self {
        Self {
            name: name.to_string(),
            z_list,
            ..Default::default()
        }
    }
}

impl Z {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for X {
    const TABLE: &'static str = "x";

    fn columns() -> Vec<Column> {
        vec![
            Column::identity("id"),
            Column::new("name", DataType::Text).not_null(),
        ]
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn to_row(&self) -> Row {
        vec![Value::Integer(self.id), Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer_at(row, 0)?,
            name: text_at(row, 1)?,
            ..Default::default()
        })
    }

    fn visit_collections<V: CollectionVisitor>(&mut self, visitor: &mut V) -> Result<()> {
        visitor.visit(self.id, &mut self.y_list)
    }
}

impl Entity for Y {
    const TABLE: &'static str = "y";

    fn columns() -> Vec<Column> {
        vec![
            Column::identity("id"),
            Column::new("x_id", DataType::Integer)
                .not_null()
                .references("x", "id"),
            Column::new("name", DataType::Text).not_null(),
        ]
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn parent_key(&self) -> Option<i64> {
        Some(self.x_id)
    }

    fn set_parent_key(&mut self, parent_key: i64) {
        self.x_id = parent_key;
    }

    fn to_row(&self) -> Row {
        vec![
            Value::Integer(self.id),
            Value::Integer(self.x_id),
            Value::Text(self.name.clone()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer_at(row, 0)?,
            x_id: integer_at(row, 1)?,
            name: text_at(row, 2)?,
            ..Default::default()
        })
    }

    fn visit_collections<V: CollectionVisitor>(&mut self, visitor: &mut V) -> Result<()> {
        visitor.visit(self.id, &mut self.z_list)
    }
}

impl Entity for Z {
    const TABLE: &'static str = "z";

    fn columns() -> Vec<Column> {
        vec![
            Column::identity("id"),
            Column::new("y_id", DataType::Integer)
                .not_null()
                .references("y", "id"),
            Column::new("name", DataType::Text).not_null(),
        ]
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn parent_key(&self) -> Option<i64> {
        Some(self.y_id)
    }

    fn set_parent_key(&mut self, parent_key: i64) {
        self.y_id = parent_key;
    }

    fn to_row(&self) -> Row {
        vec![
            Value::Integer(self.id),
            Value::Integer(self.y_id),
            Value::Text(self.name.clone()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer_at(row, 0)?,
            y_id: integer_at(row, 1)?,
            name: text_at(row, 2)?,
            ..Default::default()
        })
    }
}

// Only the display name is copied: keys, parent references and instance
// tags stay as loaded.
pub fn apply_x(scope: &MergeScope<'_>, dest: &mut X, src: X) -> Result<()> {
    dest.name = src.name;
    scope.merge_collection(dest.id, &mut dest.y_list, src.y_list)
}

pub fn apply_y(scope: &MergeScope<'_>, dest: &mut Y, src: Y) -> Result<()> {
    dest.name = src.name;
    scope.merge_collection(dest.id, &mut dest.z_list, src.z_list)
}

pub fn apply_z(_: &MergeScope<'_>, dest: &mut Z, src: Z) -> Result<()> {
    dest.name = src.name;
    Ok(())
}

pub fn mapper_config(policy: MergePolicy) -> MapperConfig {
    MapperConfig::builder()
        .policy(policy)
        .entity(EntityMap::new("X", |x: &X| x.id, apply_x))
        .entity(EntityMap::new("Y", |y: &Y| y.id, apply_y).with_parent(|y, x_id| y.x_id = x_id))
        .entity(EntityMap::new("Z", |z: &Z| z.id, apply_z).with_parent(|z, y_id| z.y_id = y_id))
        .build()
        .expect("fixture mapping is valid")
}

pub fn mapper() -> Mapper {
    Mapper::new(mapper_config(MergePolicy::default()))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A database with a unique name, so every test gets its own storage.
pub fn fresh_db() -> InMemoryDB {
    init_tracing();
    InMemoryDB::new(uuid::Uuid::new_v4().to_string())
}

pub fn context(db: &InMemoryDB) -> DbContext {
    DbContext::new(db, ContextOptions::default().sensitive_data_logging(true))
}

/// X1 owning Y1, which owns Z1 and Z2.
pub fn initial_graph() -> X {
    X::new(
        "Initial X1",
        vec![Y::new(
            "Initial X1-Y1",
            vec![Z::new("Initial X1-Y1-Z1"), Z::new("Initial X1-Y1-Z2")],
        )],
    )
}

/// Persists [`initial_graph`] through its own context and returns it with
/// keys assigned.
pub fn seed(db: &InMemoryDB) -> X {
    let mut x1 = initial_graph();
    context(db).add(&mut x1).expect("seed graph is persisted");
    x1
}

/// The detached revision: X1 and Y1 renamed, Z2 renamed, Z1 dropped and a
/// new Z added.
pub fn detached_revision(x1: &X) -> X {
    let y1 = &x1.y_list[0];
    let z2 = &y1.z_list[1];
    X {
        id: x1.id,
        name: "Initial X1 (Updated)".to_string(),
        y_list: vec![Y {
            id: y1.id,
            x_id: y1.x_id,
            name: "Initial X1-Y1 (Updated)".to_string(),
            z_list: vec![
                Z {
                    id: z2.id,
                    y_id: z2.y_id,
                    name: "Initial X1-Y1-Z1 (Updated)".to_string(),
                    ..Default::default()
                },
                Z::new("Initial X1-Y1-Z1 (Inserted)"),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn z_names(x: &X) -> Vec<&str> {
    x.y_list
        .iter()
        .flat_map(|y| y.z_list.iter().map(|z| z.name.as_str()))
        .collect()
}
