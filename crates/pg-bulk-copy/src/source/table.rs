//! In-memory tables of host values.

use async_trait::async_trait;

use crate::core::{HostType, HostValue, TabularSource};
use crate::error::{BulkCopyError, Result};

/// Named, typed column of a [`DataTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub name: String,
    pub host_type: HostType,
}

/// An in-memory table: typed columns and rows of host values.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Vec<DataColumn>,
    rows: Vec<Vec<HostValue>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column. Columns cannot be added once rows exist.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        host_type: HostType,
    ) -> Result<&mut Self> {
        if !self.rows.is_empty() {
            return Err(BulkCopyError::Config(
                "cannot add a column to a table that already has rows".into(),
            ));
        }
        self.columns.push(DataColumn {
            name: name.into(),
            host_type,
        });
        Ok(self)
    }

    /// Builder form of [`add_column`](Self::add_column) for empty tables.
    pub fn with_column(mut self, name: impl Into<String>, host_type: HostType) -> Self {
        if self.rows.is_empty() {
            self.columns.push(DataColumn {
                name: name.into(),
                host_type,
            });
        }
        self
    }

    /// Append a row; each value must be null or match its column type.
    pub fn add_row(&mut self, values: Vec<HostValue>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(BulkCopyError::Config(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (value, column) in values.iter().zip(&self.columns) {
            if !value.conforms_to(column.host_type) {
                return Err(BulkCopyError::Conversion(format!(
                    "value of type {} does not fit column {} of type {}",
                    value.type_name(),
                    column.name,
                    column.host_type
                )));
            }
        }
        self.rows.push(values);
        Ok(())
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<HostValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sequential reader over a [`DataTable`].
pub struct TableSource<'a> {
    table: &'a DataTable,
    /// Index of the current row; `None` before the first `advance`.
    current: Option<usize>,
}

impl<'a> TableSource<'a> {
    pub fn new(table: &'a DataTable) -> Self {
        Self {
            table,
            current: None,
        }
    }
}

#[async_trait]
impl TabularSource for TableSource<'_> {
    fn field_count(&self) -> usize {
        self.table.columns.len()
    }

    fn field_name(&self, index: usize) -> Option<&str> {
        self.table.columns.get(index).map(|c| c.name.as_str())
    }

    fn host_type_of(&self, index: usize) -> Option<HostType> {
        self.table.columns.get(index).map(|c| c.host_type)
    }

    async fn advance(&mut self) -> Result<bool> {
        let next = self.current.map_or(0, |i| i + 1);
        // Stay past the end once exhausted.
        self.current = Some(next.min(self.table.rows.len()));
        Ok(next < self.table.rows.len())
    }

    fn read_row(&mut self, values: &mut [HostValue]) -> Result<()> {
        let row = self
            .current
            .and_then(|i| self.table.rows.get(i))
            .ok_or_else(|| BulkCopyError::Protocol("no current row".into()))?;
        for (slot, value) in values.iter_mut().zip(row) {
            slot.clone_from(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataTable {
        let mut table = DataTable::new()
            .with_column("id", HostType::I32)
            .with_column("name", HostType::String);
        table.add_row(vec![1.into(), "ada".into()]).unwrap();
        table.add_row(vec![2.into(), HostValue::Null]).unwrap();
        table
    }

    #[test]
    fn test_add_row_checks_shape_and_types() {
        let mut table = people();
        assert!(table.add_row(vec![3.into()]).is_err());
        assert!(table.add_row(vec!["x".into(), "y".into()]).is_err());
        assert!(table.add_column("late", HostType::Bool).is_err());
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_reads_rows_in_order() {
        let table = people();
        let mut source = TableSource::new(&table);
        let mut values = vec![HostValue::Null; source.field_count()];

        assert!(source.read_row(&mut values).is_err());
        assert!(source.advance().await.unwrap());
        source.read_row(&mut values).unwrap();
        assert!(matches!(values[0], HostValue::I32(1)));

        assert!(source.advance().await.unwrap());
        source.read_row(&mut values).unwrap();
        assert!(values[1].is_null());

        assert!(!source.advance().await.unwrap());
        assert!(!source.advance().await.unwrap());
        assert_eq!(source.ordinal_of("NAME"), Some(1));
    }
}
