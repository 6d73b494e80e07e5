//! Column metadata and mapping types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::host::HostType;
use super::wire::WireType;

/// A destination column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationColumn {
    pub name: String,
    pub wire_type: WireType,
}

impl DestinationColumn {
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
        }
    }
}

/// Per-session view of one destination column.
///
/// Identity is the position in the destination's declared column order.
/// `source_ordinal` starts out equal to that position and may be overwritten
/// once by an explicit mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub wire_type: WireType,
    /// Host type a reader of this column naturally produces.
    pub host_type: HostType,
    pub source_ordinal: usize,
}

impl ColumnDescriptor {
    pub fn from_destination(position: usize, column: DestinationColumn) -> Self {
        Self {
            host_type: column.wire_type.host_type(),
            name: column.name,
            wire_type: column.wire_type,
            source_ordinal: position,
        }
    }
}

/// Reference to a column by name or zero-based ordinal.
///
/// In configuration files a string is a name and an integer is an ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Ordinal(usize),
    Name(String),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Ordinal(i) => write!(f, "#{}", i),
            ColumnRef::Name(n) => f.write_str(n),
        }
    }
}

impl From<usize> for ColumnRef {
    fn from(ordinal: usize) -> Self {
        ColumnRef::Ordinal(ordinal)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

/// Explicit source → destination column pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: ColumnRef,
    pub destination: ColumnRef,
}

impl ColumnMapping {
    pub fn new(source: impl Into<ColumnRef>, destination: impl Into<ColumnRef>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}
