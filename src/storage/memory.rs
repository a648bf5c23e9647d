use super::{Table, TableSchema};
use crate::core::{DbError, Result, Row, Value};
use std::collections::HashMap;

/// How deleting a row treats rows in other tables that still reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRule {
    /// Referencing rows are deleted too, recursively.
    Cascade,
    /// The delete fails while referencing rows exist.
    Restrict,
}

/// A row removed from a table, as reported by [`InMemoryStorage::delete_row`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedRow {
    pub table: String,
    pub key: i64,
    pub row: Row,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, Table>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }
        for (_, column) in schema.foreign_keys() {
            if let Some(target) = &column.references
                && !self.tables.contains_key(&target.table)
            {
                return Err(DbError::TableNotFound(target.table.clone()));
            }
        }

        self.tables.insert(name, Table::new(schema)?);
        Ok(())
    }

    /// Creates the table unless one with the same name exists. An existing
    /// table must have the same schema.
    pub fn ensure_table(&mut self, schema: TableSchema) -> Result<bool> {
        match self.tables.get(schema.name()) {
            Some(existing) if existing.schema() == &schema => Ok(false),
            Some(_) => Err(DbError::ConstraintViolation(format!(
                "Table '{}' already exists with a different schema",
                schema.name()
            ))),
            None => {
                self.create_table(schema)?;
                Ok(true)
            }
        }
    }

    pub fn drop_table(&mut self, table_name: &str) -> Result<()> {
        let referenced_by = self.referencing_tables(table_name);
        if let Some((child, _)) = referenced_by.first() {
            return Err(DbError::ConstraintViolation(format!(
                "Table '{}' is referenced by '{}'",
                table_name, child
            )));
        }
        if self.tables.remove(table_name).is_none() {
            return Err(DbError::TableNotFound(table_name.to_string()));
        }
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table_name: &str) -> Result<usize> {
        Ok(self.get_table(table_name)?.row_count())
    }

    pub fn get_row(&self, table_name: &str, key: i64) -> Result<Option<Row>> {
        Ok(self.get_table(table_name)?.get(key).cloned())
    }

    pub fn scan_table(&self, table_name: &str) -> Result<Vec<Row>> {
        Ok(self.get_table(table_name)?.scan())
    }

    pub fn find_rows(
        &self,
        table_name: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<(i64, Row)>> {
        self.get_table(table_name)?.find_by(column, value)
    }

    /// Inserts a row, assigning its identity. Foreign keys must point at
    /// existing rows.
    pub fn insert_row(&mut self, table_name: &str, row: Row) -> Result<i64> {
        self.check_foreign_keys(table_name, &row)?;
        self.get_table_mut(table_name)?.insert(row)
    }

    /// Replaces a row and returns the previous version.
    pub fn update_row(&mut self, table_name: &str, key: i64, row: Row) -> Result<Row> {
        self.check_foreign_keys(table_name, &row)?;
        self.get_table_mut(table_name)?.update(key, row)
    }

    /// Deletes a row. Rows referencing it are handled according to `rule`;
    /// everything removed is returned, referencing rows before the row itself.
    pub fn delete_row(
        &mut self,
        table_name: &str,
        key: i64,
        rule: DeleteRule,
    ) -> Result<Vec<DeletedRow>> {
        let mut deleted = Vec::new();
        self.delete_recursive(table_name, key, rule, &mut deleted)?;
        Ok(deleted)
    }

    fn delete_recursive(
        &mut self,
        table_name: &str,
        key: i64,
        rule: DeleteRule,
        deleted: &mut Vec<DeletedRow>,
    ) -> Result<()> {
        if !self.get_table(table_name)?.contains(key) {
            return Err(DbError::RowNotFound {
                table: table_name.to_string(),
                key,
            });
        }

        for (child_table, column) in self.referencing_tables(table_name) {
            let dependents = self.find_rows(&child_table, &column, &Value::Integer(key))?;
            if dependents.is_empty() {
                continue;
            }
            if rule == DeleteRule::Restrict {
                return Err(DbError::ConstraintViolation(format!(
                    "Delete on '{}' row {} violates foreign key constraint from '{}'",
                    table_name, key, child_table
                )));
            }
            for (child_key, _) in dependents {
                self.delete_recursive(&child_table, child_key, rule, deleted)?;
            }
        }

        let row = self.get_table_mut(table_name)?.delete(key)?;
        deleted.push(DeletedRow {
            table: table_name.to_string(),
            key,
            row,
        });
        Ok(())
    }

    /// (table, column) pairs holding a foreign key into `table_name`.
    fn referencing_tables(&self, table_name: &str) -> Vec<(String, String)> {
        let mut found: Vec<(String, String)> = self
            .tables
            .values()
            .flat_map(|table| {
                table
                    .schema()
                    .foreign_keys()
                    .filter(|(_, col)| {
                        col.references
                            .as_ref()
                            .is_some_and(|fk| fk.table == table_name)
                    })
                    .map(|(_, col)| (table.schema().name().to_string(), col.name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort();
        found
    }

    fn check_foreign_keys(&self, table_name: &str, row: &Row) -> Result<()> {
        let table = self.get_table(table_name)?;
        for (idx, column) in table.schema().foreign_keys() {
            let Some(target) = &column.references else {
                continue;
            };
            let parent_key = match row.get(idx) {
                Some(Value::Null) | None => continue,
                Some(Value::Integer(key)) => *key,
                Some(other) => {
                    return Err(DbError::TypeMismatch(format!(
                        "Foreign key '{}' expects INTEGER, got {}",
                        column.name,
                        other.type_name()
                    )));
                }
            };
            if !self.get_table(&target.table)?.contains(parent_key) {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' of '{}' references non-existent key {} in '{}'",
                    column.name, table_name, parent_key, target.table
                )));
            }
        }
        Ok(())
    }
}
