//! Seams to the upstream database driver. The gateway never talks to a
//! database directly; it opens connections, executes statements and walks
//! row cursors through these traits.

use crate::error::DriverError;
use crate::types::{BoundParameter, ColumnMeta, FieldValue};
use async_trait::async_trait;

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Execute a statement and return its row cursor. Input and in-out
    /// parameters are bound before execution.
    async fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
    ) -> Result<Box<dyn RowCursor>, DriverError>;

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait RowCursor: Send {
    fn columns(&self) -> &[ColumnMeta];

    /// Advance to the next row. Returns `false` once the cursor is exhausted.
    async fn next_row(&mut self) -> Result<bool, DriverError>;

    fn is_null(&self, ordinal: usize) -> bool;

    fn field(&self, ordinal: usize) -> Result<FieldValue, DriverError>;

    fn records_affected(&self) -> u64;

    /// Value of an output, in-out or return parameter. Only meaningful after
    /// the cursor is exhausted.
    fn parameter(&self, name: &str) -> Result<FieldValue, DriverError>;
}
