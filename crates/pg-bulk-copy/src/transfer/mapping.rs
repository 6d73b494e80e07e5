//! Explicit column mapping.

use tracing::debug;

use crate::core::{ColumnDescriptor, ColumnMapping, ColumnRef, TabularSource};
use crate::error::{BulkCopyError, Result};

fn destination_index(columns: &[ColumnDescriptor], target: &ColumnRef) -> Result<usize> {
    match target {
        ColumnRef::Name(name) => columns
            .iter()
            .position(|c| &c.name == name)
            .ok_or_else(|| BulkCopyError::UnknownDestinationColumn(name.clone())),
        ColumnRef::Ordinal(ordinal) if *ordinal < columns.len() => Ok(*ordinal),
        ColumnRef::Ordinal(ordinal) => Err(BulkCopyError::OrdinalOutOfRange {
            side: "Destination",
            ordinal: *ordinal,
            count: columns.len(),
        }),
    }
}

fn source_ordinal(source: &dyn TabularSource, field: &ColumnRef) -> Result<usize> {
    let count = source.field_count();
    match field {
        ColumnRef::Name(name) => source
            .ordinal_of(name)
            .ok_or_else(|| BulkCopyError::UnknownSourceColumn(name.clone())),
        ColumnRef::Ordinal(ordinal) if *ordinal < count => Ok(*ordinal),
        ColumnRef::Ordinal(ordinal) => Err(BulkCopyError::OrdinalOutOfRange {
            side: "Source",
            ordinal: *ordinal,
            count,
        }),
    }
}

/// Point destination columns at the source fields named by `mappings`.
///
/// Columns without a mapping keep their identity ordinal. Afterwards every
/// column must address an existing source field.
pub fn apply_mappings(
    columns: &mut [ColumnDescriptor],
    mappings: &[ColumnMapping],
    source: &dyn TabularSource,
) -> Result<()> {
    for mapping in mappings {
        let index = destination_index(columns, &mapping.destination)?;
        let ordinal = source_ordinal(source, &mapping.source)?;
        debug!(
            "Mapped source {} (#{}) to destination {}",
            mapping.source, ordinal, columns[index].name
        );
        columns[index].source_ordinal = ordinal;
    }

    let count = source.field_count();
    if let Some(column) = columns.iter().find(|c| c.source_ordinal >= count) {
        return Err(BulkCopyError::OrdinalOutOfRange {
            side: "Source",
            ordinal: column.source_ordinal,
            count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DestinationColumn, HostType, WireType};
    use crate::source::{DataTable, TableSource};

    fn columns() -> Vec<ColumnDescriptor> {
        ["id", "name", "email"]
            .iter()
            .enumerate()
            .map(|(i, n)| {
                ColumnDescriptor::from_destination(i, DestinationColumn::new(*n, WireType::Text))
            })
            .collect()
    }

    fn table() -> DataTable {
        DataTable::new()
            .with_column("Email", HostType::String)
            .with_column("id", HostType::String)
            .with_column("full_name", HostType::String)
    }

    #[test]
    fn test_unmapped_columns_keep_identity() {
        let table = table();
        let source = TableSource::new(&table);
        let mut cols = columns();
        apply_mappings(&mut cols, &[ColumnMapping::new("email", "email")], &source).unwrap();
        let ordinals: Vec<usize> = cols.iter().map(|c| c.source_ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 0]);
    }

    #[test]
    fn test_name_and_ordinal_mappings() {
        let table = table();
        let source = TableSource::new(&table);
        let mut cols = columns();
        let mappings = vec![
            ColumnMapping::new("id", 0usize),
            ColumnMapping::new(2usize, "name"),
            ColumnMapping::new("Email", "email"),
        ];
        apply_mappings(&mut cols, &mappings, &source).unwrap();
        let ordinals: Vec<usize> = cols.iter().map(|c| c.source_ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 0]);
    }

    #[test]
    fn test_unknown_names_and_ordinals() {
        let table = table();
        let source = TableSource::new(&table);

        let err = apply_mappings(&mut columns(), &[ColumnMapping::new("id", "ID")], &source)
            .unwrap_err();
        assert!(matches!(err, BulkCopyError::UnknownDestinationColumn(ref n) if n == "ID"));

        let err = apply_mappings(&mut columns(), &[ColumnMapping::new("phone", "id")], &source)
            .unwrap_err();
        assert!(matches!(err, BulkCopyError::UnknownSourceColumn(_)));

        let err = apply_mappings(&mut columns(), &[ColumnMapping::new(5usize, "id")], &source)
            .unwrap_err();
        assert!(matches!(err, BulkCopyError::OrdinalOutOfRange { side: "Source", .. }));

        let err = apply_mappings(&mut columns(), &[ColumnMapping::new("id", 3usize)], &source)
            .unwrap_err();
        assert!(matches!(err, BulkCopyError::OrdinalOutOfRange { side: "Destination", .. }));
    }

    #[test]
    fn test_identity_must_address_a_source_field() {
        let narrow = DataTable::new().with_column("id", HostType::String);
        let source = TableSource::new(&narrow);
        let mut cols = columns();
        assert!(apply_mappings(&mut cols, &[], &source).is_err());
    }
}
