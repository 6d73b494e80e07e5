//! Destination schema resolution.

use tracing::debug;

use crate::core::{ColumnDescriptor, Connection};
use crate::error::{BulkCopyError, Result};

/// Fetch the columns of `table` in declaration order.
///
/// Each descriptor starts with the identity source ordinal. A table without
/// columns is rejected since a binary import needs at least one field.
pub async fn resolve_schema(
    connection: &mut dyn Connection,
    table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let columns = connection.describe_table(table).await?;
    if columns.is_empty() {
        return Err(BulkCopyError::metadata(table, "table has no columns"));
    }

    let descriptors: Vec<ColumnDescriptor> = columns
        .into_iter()
        .enumerate()
        .map(|(position, column)| ColumnDescriptor::from_destination(position, column))
        .collect();
    for d in &descriptors {
        debug!("  {}: {} ({})", d.name, d.wire_type, d.host_type);
    }
    Ok(descriptors)
}
