//! In-memory driver answering registered statements with canned result sets.

use crate::driver::{Connection, Driver, RowCursor};
use crate::error::DriverError;
use crate::types::{BoundParameter, ColumnMeta, FieldValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub sql: String,
    #[serde(default)]
    pub columns: Vec<ColumnMeta>,
    #[serde(default)]
    pub rows: Vec<Vec<FieldValue>>,
    #[serde(default)]
    pub records_affected: u64,
    /// Fail execution with this message instead of returning rows.
    #[serde(default)]
    pub error: Option<String>,
    /// Artificial latency before each row becomes available.
    #[serde(default)]
    pub row_delay_ms: u64,
    /// Values reported for output parameters.
    #[serde(default)]
    pub parameters: HashMap<String, FieldValue>,
}

impl Fixture {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn columns(mut self, columns: Vec<ColumnMeta>) -> Self {
        self.columns = columns;
        self
    }

    pub fn row(mut self, values: Vec<FieldValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn records_affected(mut self, count: u64) -> Self {
        self.records_affected = count;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn row_delay(mut self, delay: Duration) -> Self {
        self.row_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Default)]
pub struct FixtureCatalog {
    fixtures: HashMap<String, Fixture>,
}

impl FixtureCatalog {
    pub fn new() -> Self {
        Self {
            fixtures: HashMap::new(),
        }
    }

    pub fn register(&mut self, mut fixture: Fixture) -> Result<(), DriverError> {
        let key = normalize_sql(&fixture.sql);
        if self.fixtures.contains_key(&key) {
            return Err(DriverError::execution(format!(
                "statement already registered: {}",
                fixture.sql
            )));
        }
        for (ordinal, column) in fixture.columns.iter_mut().enumerate() {
            column.ordinal = ordinal;
            column.resolve_type_name();
        }
        self.fixtures.insert(key, fixture);
        Ok(())
    }

    pub fn get(&self, sql: &str) -> Option<&Fixture> {
        self.fixtures.get(&normalize_sql(sql))
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

/// Collapse whitespace and drop a trailing semicolon so that cosmetic
/// differences in submitted SQL still hit the same fixture.
pub fn normalize_sql(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    catalog: Arc<FixtureCatalog>,
    accepted: Vec<String>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MemoryDriver {
    pub fn new(catalog: FixtureCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            accepted: Vec::new(),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_fixtures(fixtures: impl IntoIterator<Item = Fixture>) -> Result<Self, DriverError> {
        let mut catalog = FixtureCatalog::new();
        for fixture in fixtures {
            catalog.register(fixture)?;
        }
        Ok(Self::new(catalog))
    }

    /// Only accept these connection strings; any other fails to connect.
    /// An empty list accepts everything.
    pub fn accept_only(mut self, connection_strings: Vec<String>) -> Self {
        self.accepted = connection_strings;
        self
    }

    /// Every statement executed through connections of this driver, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError> {
        if !self.accepted.is_empty() && !self.accepted.iter().any(|s| s == connection_string) {
            return Err(DriverError::connect(
                "ORA-12154: could not resolve the connect identifier specified",
            ));
        }
        Ok(Box::new(MemoryConnection {
            catalog: self.catalog.clone(),
            journal: self.journal.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    catalog: Arc<FixtureCatalog>,
    journal: Arc<Mutex<Vec<String>>>,
    closed: bool,
}

impl MemoryConnection {
    fn record(&self, sql: &str) {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(normalize_sql(sql));
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
    ) -> Result<Box<dyn RowCursor>, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.record(sql);
        let fixture = self
            .catalog
            .get(sql)
            .ok_or_else(|| DriverError::execution("ORA-00942: table or view does not exist"))?;
        if let Some(message) = &fixture.error {
            return Err(DriverError::execution(message.clone()));
        }
        let mut outputs = fixture.parameters.clone();
        for param in parameters {
            if param.direction.carries_input() && param.direction.carries_output() {
                outputs
                    .entry(param.name.clone())
                    .or_insert_with(|| param.value.clone());
            }
        }
        Ok(Box::new(MemoryCursor {
            columns: fixture.columns.clone(),
            pending: fixture.rows.iter().cloned().collect(),
            current: None,
            row_delay: Duration::from_millis(fixture.row_delay_ms),
            records_affected: fixture.records_affected,
            outputs,
        }))
    }

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.record(sql);
        match self.catalog.get(sql) {
            Some(fixture) => match &fixture.error {
                Some(message) => Err(DriverError::execution(message.clone())),
                None => Ok(fixture.records_affected),
            },
            None => Ok(0),
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}

struct MemoryCursor {
    columns: Vec<ColumnMeta>,
    pending: VecDeque<Vec<FieldValue>>,
    current: Option<Vec<FieldValue>>,
    row_delay: Duration,
    records_affected: u64,
    outputs: HashMap<String, FieldValue>,
}

impl MemoryCursor {
    fn current_field(&self, ordinal: usize) -> Option<&FieldValue> {
        self.current.as_ref().and_then(|row| row.get(ordinal))
    }
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<bool, DriverError> {
        if self.pending.is_empty() {
            self.current = None;
            return Ok(false);
        }
        if !self.row_delay.is_zero() {
            tokio::time::sleep(self.row_delay).await;
        }
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn is_null(&self, ordinal: usize) -> bool {
        self.current_field(ordinal).map_or(true, FieldValue::is_null)
    }

    fn field(&self, ordinal: usize) -> Result<FieldValue, DriverError> {
        self.current_field(ordinal)
            .cloned()
            .ok_or(DriverError::ColumnOutOfRange(ordinal))
    }

    fn records_affected(&self) -> u64 {
        self.records_affected
    }

    fn parameter(&self, name: &str) -> Result<FieldValue, DriverError> {
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::UnknownParameter(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NativeType, ParameterDirection, TypeTag};

    fn dual() -> Fixture {
        Fixture::new("SELECT 1 FROM dual")
            .columns(vec![ColumnMeta::new(9, "1", NativeType::Number)])
            .row(vec![FieldValue::Number("1".into())])
    }

    #[test]
    fn duplicate_fixture_is_rejected() {
        let mut catalog = FixtureCatalog::new();
        catalog.register(dual()).expect("register");
        let err = catalog
            .register(Fixture::new("SELECT 1   FROM dual;"))
            .expect_err("duplicate");
        assert!(matches!(err, DriverError::Execution(_)));
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn cursor_walks_registered_rows() {
        let driver = MemoryDriver::from_fixtures([dual()]).expect("driver");
        let mut conn = driver.open("anything").await.expect("open");
        let mut cursor = conn.execute("SELECT 1 FROM dual;", &[]).await.expect("execute");
        assert_eq!(cursor.columns()[0].ordinal, 0);
        assert!(cursor.next_row().await.expect("row"));
        assert!(!cursor.is_null(0));
        assert_eq!(cursor.field(0).expect("field"), FieldValue::Number("1".into()));
        assert!(!cursor.next_row().await.expect("end"));
        assert_eq!(cursor.records_affected(), 0);
        assert_eq!(driver.journal(), vec!["SELECT 1 FROM dual".to_string()]);
    }

    #[tokio::test]
    async fn unknown_statement_fails_execution() {
        let driver = MemoryDriver::default();
        let mut conn = driver.open("anything").await.expect("open");
        let err = conn.execute("SELECT * FROM nowhere", &[]).await.err().expect("error");
        assert!(err.to_string().contains("ORA-00942"));
    }

    #[tokio::test]
    async fn rejects_unlisted_connection_strings() {
        let driver = MemoryDriver::default().accept_only(vec!["db1".into()]);
        assert!(driver.open("db1").await.is_ok());
        let err = driver.open("db2").await.err().expect("reject");
        assert!(matches!(err, DriverError::Connect(_)));
    }

    #[tokio::test]
    async fn in_out_parameters_echo_back() {
        let driver = MemoryDriver::from_fixtures([Fixture::new("BEGIN bump(:n); END;")
            .parameter("ret", FieldValue::Integer(7))])
        .expect("driver");
        let mut conn = driver.open("x").await.expect("open");
        let params = vec![BoundParameter {
            name: "n".into(),
            type_tag: TypeTag::Number,
            direction: ParameterDirection::InputOutput,
            precision: 0,
            value: FieldValue::Integer(41),
        }];
        let mut cursor = conn.execute("BEGIN bump(:n); END;", &params).await.expect("execute");
        assert!(!cursor.next_row().await.expect("no rows"));
        assert_eq!(cursor.parameter("n").expect("n"), FieldValue::Integer(41));
        assert_eq!(cursor.parameter("ret").expect("ret"), FieldValue::Integer(7));
        assert!(cursor.parameter("missing").is_err());
    }
}
