pub mod driver;
pub mod error;
pub mod memory;
pub mod types;

pub use driver::{Connection, Driver, RowCursor};
pub use error::DriverError;
pub use memory::{Fixture, FixtureCatalog, MemoryDriver};
pub use types::{
    BoundParameter, ColumnMeta, DaySecondInterval, FieldValue, NativeType, ParameterDirection,
    TypeTag,
};
