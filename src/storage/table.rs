use crate::core::{Column, DataType, DbError, Result, Row, Schema, Value};
use im::{OrdMap, OrdSet};
use std::collections::HashMap;

/// A table of rows keyed by their identity value.
///
/// Rows and indexes live in persistent maps, so cloning a table (which every
/// transaction does when it stages the storage) shares structure instead of
/// copying rows.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: OrdMap<i64, Row>,
    next_key: i64,
    indexes: HashMap<String, OrdMap<Value, OrdSet<i64>>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Result<Self> {
        schema.validate()?;

        let mut table = Self {
            schema,
            rows: OrdMap::new(),
            next_key: 1,
            indexes: HashMap::new(),
        };

        let foreign: Vec<String> = table
            .schema
            .schema()
            .columns()
            .iter()
            .filter(|col| col.references.is_some())
            .map(|col| col.name.clone())
            .collect();
        for column in foreign {
            table.create_index(&column)?;
        }

        Ok(table)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Inserts a row and returns the identity assigned to it.
    ///
    /// The identity column must be unset (0 or NULL) on the way in.
    pub fn insert(&mut self, mut row: Row) -> Result<i64> {
        let key_idx = self.schema.key_index();
        match row.get(key_idx) {
            Some(Value::Null) | Some(Value::Integer(0)) => {}
            Some(other) => {
                return Err(DbError::ConstraintViolation(format!(
                    "Identity column of '{}' is assigned by the store, got {}",
                    self.schema.name(),
                    other
                )));
            }
            None => {}
        }

        let key = self.next_key;
        if key_idx < row.len() {
            row[key_idx] = Value::Integer(key);
        }
        self.validate_row(&row)?;

        self.next_key += 1;
        self.add_to_indexes(key, &row);
        self.rows.insert(key, row);

        Ok(key)
    }

    /// Replaces the row stored under `key`. The identity value may not change.
    pub fn update(&mut self, key: i64, new_row: Row) -> Result<Row> {
        self.validate_row(&new_row)?;
        if new_row[self.schema.key_index()] != Value::Integer(key) {
            return Err(DbError::ConstraintViolation(format!(
                "Identity of row {} in '{}' cannot change",
                key,
                self.schema.name()
            )));
        }

        let old_row = self.rows.get(&key).cloned().ok_or_else(|| DbError::RowNotFound {
            table: self.schema.name().to_string(),
            key,
        })?;

        self.remove_from_indexes(key, &old_row);
        self.add_to_indexes(key, &new_row);
        self.rows.insert(key, new_row);

        Ok(old_row)
    }

    pub fn delete(&mut self, key: i64) -> Result<Row> {
        let old_row = self.rows.remove(&key).ok_or_else(|| DbError::RowNotFound {
            table: self.schema.name().to_string(),
            key,
        })?;
        self.remove_from_indexes(key, &old_row);
        Ok(old_row)
    }

    pub fn get(&self, key: i64) -> Option<&Row> {
        self.rows.get(&key)
    }

    pub fn contains(&self, key: i64) -> bool {
        self.rows.contains_key(&key)
    }

    /// All rows in key order.
    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    /// Rows whose `column` equals `value`, in key order.
    pub fn find_by(&self, column: &str, value: &Value) -> Result<Vec<(i64, Row)>> {
        if let Some(index) = self.indexes.get(column) {
            let keys = index.get(value).cloned().unwrap_or_default();
            return Ok(keys
                .into_iter()
                .filter_map(|key| self.rows.get(&key).map(|row| (key, row.clone())))
                .collect());
        }

        let col_idx = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .filter(|(_, row)| &row[col_idx] == value)
            .map(|(key, row)| (*key, row.clone()))
            .collect())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn create_index(&mut self, column_name: &str) -> Result<()> {
        if self.indexes.contains_key(column_name) {
            return Ok(());
        }
        let col_idx = self.column_index(column_name)?;
        let mut index: OrdMap<Value, OrdSet<i64>> = OrdMap::new();
        for (key, row) in &self.rows {
            index.entry(row[col_idx].clone()).or_insert_with(OrdSet::new).insert(*key);
        }
        self.indexes.insert(column_name.to_string(), index);
        Ok(())
    }

    pub fn is_indexed(&self, column_name: &str) -> bool {
        self.indexes.contains_key(column_name)
    }

    fn column_index(&self, column_name: &str) -> Result<usize> {
        self.schema
            .schema()
            .find_column_index(column_name)
            .ok_or_else(|| {
                DbError::ColumnNotFound(column_name.to_string(), self.schema.name().to_string())
            })
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn add_to_indexes(&mut self, key: i64, row: &Row) {
        for (col_name, index) in &mut self.indexes {
            if let Some(col_idx) = self.schema.schema().find_column_index(col_name) {
                index.entry(row[col_idx].clone()).or_insert_with(OrdSet::new).insert(key);
            }
        }
    }

    fn remove_from_indexes(&mut self, key: i64, row: &Row) {
        for (col_name, index) in &mut self.indexes {
            if let Some(col_idx) = self.schema.schema().find_column_index(col_name)
                && let Some(keys) = index.get_mut(&row[col_idx])
            {
                keys.remove(&key);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    schema: Schema,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Position of the identity column. Only meaningful on a validated schema.
    pub fn key_index(&self) -> usize {
        self.schema
            .columns()
            .iter()
            .position(|col| col.primary_key)
            .unwrap_or(0)
    }

    /// The column pointing at the owning parent row, if this table has one.
    pub fn parent_column(&self) -> Option<&Column> {
        self.schema.columns().iter().find(|col| col.references.is_some())
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, col)| col.references.is_some())
    }

    /// Checks the shape the store relies on: one integer identity column
    /// and at most one parent reference.
    pub fn validate(&self) -> Result<()> {
        let keys: Vec<&Column> = self
            .schema
            .columns()
            .iter()
            .filter(|col| col.primary_key)
            .collect();
        match keys.as_slice() {
            [key] if key.data_type == DataType::Integer => {}
            [key] => {
                return Err(DbError::TypeMismatch(format!(
                    "Identity column '{}' of '{}' must be INTEGER",
                    key.name, self.name
                )));
            }
            _ => {
                return Err(DbError::ConstraintViolation(format!(
                    "Table '{}' needs exactly one identity column, found {}",
                    self.name,
                    keys.len()
                )));
            }
        }

        if self.foreign_keys().count() > 1 {
            return Err(DbError::ConstraintViolation(format!(
                "Table '{}' may reference at most one parent table",
                self.name
            )));
        }

        Ok(())
    }
}
