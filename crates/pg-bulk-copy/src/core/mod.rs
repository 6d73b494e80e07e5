//! Core abstractions for bulk copy.
//!
//! - [`host`]: Runtime type tags and dynamically typed source values
//! - [`wire`]: PostgreSQL wire types and OIDs
//! - [`value`]: Protocol-level values produced by encoders
//! - [`schema`]: Column descriptors and mappings
//! - [`traits`]: Source, connection and import session contracts

pub mod geometry;
pub mod host;
pub mod net;
pub mod schema;
pub mod traits;
pub mod value;
pub mod wire;

pub use geometry::{Circle, GeoBox, Line, LineSegment, Path, Point, Polygon};
pub use host::{CustomValue, HostArray, HostRange, HostType, HostValue};
pub use net::{Inet, MacAddress};
pub use schema::{ColumnDescriptor, ColumnMapping, ColumnRef, DestinationColumn};
pub use traits::{Connection, ImportSession, TabularSource};
pub use value::{BitString, Interval, PgRange, PgValue};
pub use wire::WireType;
