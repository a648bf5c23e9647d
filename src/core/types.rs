use super::{DataType, DbError, Result, Value};
use serde::{Deserialize, Serialize};

pub type Row = Vec<Value>;

/// Target of a foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub references: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            references: None,
        }
    }

    /// Identity column: integer, never null, assigned by the store.
    pub fn identity(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, DataType::Integer).not_null()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }
}

/// Reads an integer cell, treating NULL as an error.
pub fn integer_at(row: &Row, index: usize) -> Result<i64> {
    match row.get(index) {
        Some(Value::Integer(i)) => Ok(*i),
        Some(other) => Err(DbError::TypeMismatch(format!(
            "Expected INTEGER at position {}, got {}",
            index,
            other.type_name()
        ))),
        None => Err(DbError::ExecutionError(format!(
            "Row has no column at position {}",
            index
        ))),
    }
}

/// Reads a text cell, mapping NULL to an empty string.
pub fn text_at(row: &Row, index: usize) -> Result<String> {
    match row.get(index) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Err(DbError::TypeMismatch(format!(
            "Expected TEXT at position {}, got {}",
            index,
            other.type_name()
        ))),
        None => Err(DbError::ExecutionError(format!(
            "Row has no column at position {}",
            index
        ))),
    }
}
