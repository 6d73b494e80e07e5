//! PostgreSQL destination over tokio-postgres.
//!
//! Rows are framed into a binary COPY stream in a [`CopyWriter`] buffer and
//! pushed through a `CopyInSink` whenever the buffer grows past the flush
//! threshold.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, CopyInSink, NoTls};
use tracing::{debug, info, warn};

use super::tls::SslMode;
use crate::codec::CopyWriter;
use crate::config::{TargetConfig, DEFAULT_FLUSH_BYTES};
use crate::core::{Connection, DestinationColumn, ImportSession, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

/// Connect timeout for new connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `fut`, failing with [`BulkCopyError::Timeout`] when it takes longer
/// than `timeout`.
pub(crate) async fn with_timeout<F, T, E>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<BulkCopyError>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(BulkCopyError::Timeout(limit)),
        },
        None => fut.await.map_err(Into::into),
    }
}

/// Single PostgreSQL connection used as a bulk copy destination.
pub struct PgConnection {
    config: TargetConfig,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
    flush_bytes: usize,
}

impl PgConnection {
    /// Create an unopened connection.
    pub fn new(config: TargetConfig) -> Self {
        Self {
            config,
            client: None,
            driver: None,
            flush_bytes: DEFAULT_FLUSH_BYTES,
        }
    }

    /// Set the buffered byte count that triggers a flush during COPY.
    pub fn with_flush_bytes(mut self, flush_bytes: usize) -> Self {
        self.flush_bytes = flush_bytes.max(1);
        self
    }

    /// Underlying client, when open.
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.config.host);
        pg_config.port(self.config.port);
        pg_config.dbname(&self.config.database);
        pg_config.user(&self.config.user);
        pg_config.password(&self.config.password);
        pg_config.application_name("pg-bulk-copy");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config
    }

    fn client_mut(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| BulkCopyError::Protocol("connection is not open".into()))
    }

    /// Round-trip a trivial query.
    pub async fn ping(&mut self) -> Result<()> {
        self.client_mut()?.simple_query("SELECT 1").await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn open(&mut self) -> Result<()> {
        let context = format!("connecting to {}", self.config.endpoint());
        let pg_config = self.pg_config();

        let ssl_mode: SslMode = self.config.ssl_mode.parse()?;
        let (client, driver) = match ssl_mode.connector()? {
            Some(tls) => {
                let (client, connection) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| BulkCopyError::connection(e.to_string(), &context))?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection error: {}", e);
                    }
                });
                (client, driver)
            }
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| BulkCopyError::connection(e.to_string(), &context))?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection error: {}", e);
                    }
                });
                (client, driver)
            }
        };

        info!("Connected to PostgreSQL: {}", self.config.endpoint());
        self.client = Some(client);
        self.driver = Some(driver);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client ends the connection task.
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.await.map_err(|e| {
                BulkCopyError::connection(
                    e.to_string(),
                    format!("closing {}", self.config.endpoint()),
                )
            })?;
        }
        debug!("Closed PostgreSQL connection to {}", self.config.endpoint());
        Ok(())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<DestinationColumn>> {
        let sql = format!("SELECT * FROM {} WHERE false", table);
        let statement = self
            .client_mut()?
            .prepare(&sql)
            .await
            .map_err(|e| BulkCopyError::metadata(table, e.to_string()))?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| DestinationColumn::new(c.name(), WireType::from_oid(c.type_().oid())))
            .collect())
    }

    async fn begin_import<'a>(
        &'a mut self,
        table: &str,
        column_count: usize,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn ImportSession + 'a>> {
        let writer = CopyWriter::new(column_count)?;
        let flush_bytes = self.flush_bytes;
        let sql = format!("COPY {} FROM STDIN (FORMAT BINARY)", table);
        let client = self.client_mut()?;
        let sink: CopyInSink<Bytes> = with_timeout(timeout, client.copy_in(&sql)).await?;
        debug!("Started binary COPY into {}", table);
        Ok(Box::new(PgImportSession {
            sink: Box::pin(sink),
            writer,
            flush_bytes,
            timeout,
        }))
    }
}

/// Binary COPY in progress on a [`PgConnection`].
///
/// Dropping the session drops the sink, which makes the server abort the
/// COPY and discard every row sent so far.
struct PgImportSession {
    sink: Pin<Box<CopyInSink<Bytes>>>,
    writer: CopyWriter,
    flush_bytes: usize,
    timeout: Option<Duration>,
}

impl PgImportSession {
    async fn flush(&mut self) -> Result<()> {
        let chunk = self.writer.take_chunk();
        if chunk.is_empty() {
            return Ok(());
        }
        with_timeout(self.timeout, self.sink.send(chunk)).await
    }

    async fn flush_if_full(&mut self) -> Result<()> {
        if self.writer.buffered_len() >= self.flush_bytes {
            self.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ImportSession for PgImportSession {
    async fn start_row(&mut self) -> Result<()> {
        self.writer.start_row()
    }

    async fn write(&mut self, value: &PgValue, wire_type: WireType) -> Result<()> {
        self.writer.write(value, wire_type)?;
        self.flush_if_full().await
    }

    async fn write_null(&mut self) -> Result<()> {
        self.writer.write_null()?;
        self.flush_if_full().await
    }

    async fn complete(&mut self) -> Result<u64> {
        let written = self.writer.finish()?;
        self.flush().await?;
        let accepted = with_timeout(self.timeout, self.sink.as_mut().finish()).await?;
        if accepted != written {
            warn!("Server accepted {} of {} rows", accepted, written);
        }
        Ok(accepted)
    }
}
