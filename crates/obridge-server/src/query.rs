//! Execution of one statement: bind, execute, stream the result set and
//! report how it ended.

use crate::transport::Outbound;
use metrics::counter;
use obridge_core::{Connection, DriverError};
use obridge_protocol::backend::encode;
use obridge_protocol::row::{write_row, write_table_header, RowError};
use obridge_protocol::{
    BackendMessage, ColumnDescriptor, ErrorCode, OutputParameter, QueryRequest, Response,
    ResponseType, WireError,
};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Rows written between explicit flushes of the outbound stream.
pub const ROW_FLUSH_INTERVAL: u64 = 128;

/// How long buffered rows may wait on a slow cursor before being flushed.
pub const ROW_FLUSH_DELAY: Duration = Duration::from_millis(50);

pub type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

#[derive(Debug, Error)]
enum QueryError {
    #[error("cancelled")]
    Cancelled,
    #[error("query timed out")]
    TimedOut,
    #[error(transparent)]
    Driver(DriverError),
    #[error("{0}")]
    Conversion(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<RowError> for QueryError {
    fn from(err: RowError) -> Self {
        match err {
            RowError::Driver(err) => QueryError::Conversion(err.to_string()),
            RowError::Wire(err) => err.into(),
        }
    }
}

impl From<WireError> for QueryError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(err) => QueryError::Io(err),
            other => QueryError::Conversion(other.to_string()),
        }
    }
}

/// What a query needs from its session.
#[derive(Clone)]
pub struct QueryContext {
    pub connection: SharedConnection,
    pub outbound: Outbound,
    /// The owning session's scope; cancelled on fatal I/O failures.
    pub session: CancellationToken,
    pub timeout: Option<Duration>,
}

/// Handle to a query running in the background.
pub struct Query {
    token: CancellationToken,
    handle: JoinHandle<QueryState>,
    outbound: Outbound,
    session: CancellationToken,
}

impl Query {
    pub fn start(request: QueryRequest, ctx: QueryContext) -> Self {
        let token = ctx.session.child_token();
        let outbound = ctx.outbound.clone();
        let session = ctx.session.clone();
        let run = QueryRun {
            deadline: ctx.timeout.map(|timeout| Instant::now() + timeout),
            token: token.clone(),
            ctx,
        };
        let handle = tokio::spawn(run.execute(request));
        Self {
            token,
            handle,
            outbound,
            session,
        }
    }

    /// Request cancellation and wait until the query has reported.
    pub async fn stop(self) -> QueryState {
        self.token.cancel();
        self.finish().await
    }

    pub async fn finish(self) -> QueryState {
        match self.handle.await {
            Ok(state) => state,
            Err(err) => {
                error!("query task failed: {err}");
                counter!("obridge_query_errors_total", "state" => "Failed").increment(1);
                if !self.session.is_cancelled() {
                    let msg = BackendMessage::error(
                        ErrorCode::QueryExecutionFailed,
                        "query execution aborted unexpectedly",
                    );
                    let sent = match encode(&msg) {
                        Ok(response) => self.outbound.send_and_flush(&response).await,
                        Err(err) => Err(io::Error::other(err.to_string())),
                    };
                    if let Err(err) = sent {
                        warn!("failed to report query outcome: {err}");
                        self.session.cancel();
                    }
                }
                QueryState::Failed
            }
        }
    }
}

struct QueryRun {
    ctx: QueryContext,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryRun {
    async fn execute(self, request: QueryRequest) -> QueryState {
        counter!("obridge_queries_total").increment(1);
        debug!(sql = %request.sql, params = request.parameters.len(), "executing query");
        let err = match self.stream(&request).await {
            Ok(rows) => {
                debug!(rows, "query completed");
                return QueryState::Completed;
            }
            Err(err) => err,
        };

        let (state, report) = match err {
            QueryError::Cancelled if self.ctx.session.is_cancelled() => (QueryState::Cancelled, None),
            QueryError::Cancelled => (
                QueryState::Cancelled,
                Some(BackendMessage::error(
                    ErrorCode::QueryCancelledByClient,
                    "Cancelled by client",
                )),
            ),
            QueryError::TimedOut => (
                QueryState::TimedOut,
                Some(BackendMessage::error(
                    ErrorCode::QueryExecutionFailed,
                    "query timed out",
                )),
            ),
            QueryError::Driver(err) => (
                QueryState::Failed,
                Some(BackendMessage::OracleQueryError {
                    message: err.to_string(),
                }),
            ),
            QueryError::Conversion(message) => (
                QueryState::Failed,
                Some(BackendMessage::error(ErrorCode::QueryExecutionFailed, message)),
            ),
            QueryError::Io(err) => {
                error!("query output failed: {err}");
                self.ctx.session.cancel();
                (QueryState::Failed, None)
            }
        };
        counter!("obridge_query_errors_total", "state" => format!("{state:?}")).increment(1);

        if let Some(msg) = report {
            debug!(?state, "query ended early");
            if let Err(err) = self.report(&msg).await {
                warn!("failed to report query outcome: {err}");
                self.ctx.session.cancel();
            }
        }
        state
    }

    async fn report(&self, msg: &BackendMessage) -> Result<(), QueryError> {
        let response = encode(msg)?;
        self.ctx.outbound.send_and_flush(&response).await?;
        Ok(())
    }

    /// Race a driver call against cancellation and the deadline.
    async fn guarded<T, F>(&self, call: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, DriverError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(QueryError::Cancelled),
            _ = deadline => Err(QueryError::TimedOut),
            result = call => result.map_err(QueryError::Driver),
        }
    }

    async fn stream(&self, request: &QueryRequest) -> Result<u64, QueryError> {
        let outbound = &self.ctx.outbound;
        let mut connection = self
            .guarded(async { Ok::<_, DriverError>(self.ctx.connection.lock().await) })
            .await?;
        let mut cursor = self
            .guarded(connection.execute(&request.sql, &request.parameters))
            .await?;

        let columns: Vec<ColumnDescriptor> = cursor
            .columns()
            .iter()
            .cloned()
            .map(ColumnDescriptor::new)
            .collect();
        let mut header = Response::new(ResponseType::TableHeader);
        write_table_header(&columns, header.payload_mut());
        outbound.send_and_flush(&header).await?;

        let mut rows = 0u64;
        let mut unflushed = false;
        loop {
            let more = {
                let next = self.guarded(cursor.next_row());
                tokio::pin!(next);
                if unflushed {
                    tokio::select! {
                        more = &mut next => more?,
                        _ = tokio::time::sleep(ROW_FLUSH_DELAY) => {
                            outbound.flush().await?;
                            unflushed = false;
                            next.await?
                        }
                    }
                } else {
                    next.await?
                }
            };
            if !more {
                break;
            }
            let mut row = Response::new(ResponseType::RowDataBatch);
            write_row(&columns, cursor.as_ref(), row.payload_mut())?;
            outbound.send(&row).await?;
            rows += 1;
            unflushed = rows % ROW_FLUSH_INTERVAL != 0;
            if !unflushed {
                outbound.flush().await?;
            }
        }
        counter!("obridge_rows_streamed_total").increment(rows);

        let mut output = Vec::new();
        for param in request.parameters.iter().filter(|p| p.direction.carries_output()) {
            let value = cursor
                .parameter(&param.name)
                .map_err(|err| QueryError::Conversion(err.to_string()))?;
            output.push(OutputParameter {
                name: param.name.clone(),
                type_tag: param.type_tag,
                direction: param.direction,
                precision: param.precision,
                value,
            });
        }
        let end = encode(&BackendMessage::EndOfRowStream {
            records_affected: cursor.records_affected(),
            output,
        })?;
        outbound.send_and_flush(&end).await?;
        Ok(rows)
    }
}
