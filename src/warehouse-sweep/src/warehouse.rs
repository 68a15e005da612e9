//! Warehouse access over Flight SQL.

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow_flight::Action;
use arrow_flight::sql::client::FlightSqlServiceClient;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::config::ConnectionConfig;

/// Flight action that ends a server-side session.
const CLOSE_SESSION: &str = "CloseSession";

/// Header carrying the warehouse project identifier.
const PROJECT_ID_HEADER: &str = "project_id";

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("query error: {0}")]
    Query(String),
}

impl WarehouseError {
    /// Classify a Flight SQL failure. The client folds gRPC statuses into
    /// the error text, so the status code is recovered from there.
    fn from_arrow(error: ArrowError) -> Self {
        let message = error.to_string();
        if message.contains("Unauthenticated") || message.contains("PermissionDenied") {
            Self::Auth(message)
        } else if message.contains("Unavailable") {
            Self::Connection(message)
        } else {
            Self::Query(message)
        }
    }
}

/// Where the sweep reads its table-deletion events from.
#[async_trait]
pub trait EventSource: Send {
    /// Run `query` and materialize the whole result set.
    async fn fetch(&mut self, query: &str) -> Result<Vec<RecordBatch>, WarehouseError>;

    /// End the session. Called once on every exit path.
    async fn close(&mut self) -> Result<(), WarehouseError>;
}

/// A single authenticated Flight SQL session.
pub struct FlightSqlSession {
    client: FlightSqlServiceClient<Channel>,
    endpoint_url: String,
    token: String,
    project_id: Option<String>,
    closed: bool,
}

impl FlightSqlSession {
    /// Connect to the configured endpoint and attach credentials.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, WarehouseError> {
        let endpoint_url = config.endpoint_url();

        let mut endpoint = Endpoint::from_shared(endpoint_url.clone())
            .map_err(|e| {
                WarehouseError::Config(format!("invalid warehouse endpoint '{endpoint_url}': {e}"))
            })?
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        if config.tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| WarehouseError::Config(format!("invalid TLS configuration: {e}")))?;
        }

        let channel = endpoint.connect().await.map_err(|e| {
            WarehouseError::Connection(format!("failed to connect to {endpoint_url}: {e}"))
        })?;

        let mut client = FlightSqlServiceClient::new(channel);
        client.set_token(config.token.clone());
        if let Some(project_id) = &config.project_id {
            client.set_header(PROJECT_ID_HEADER, project_id.clone());
        }

        tracing::info!(endpoint = %endpoint_url, "Connected to warehouse");

        Ok(Self {
            client,
            endpoint_url,
            token: config.token.clone(),
            project_id: config.project_id.clone(),
            closed: false,
        })
    }

    /// Plain Flight request carrying the session's credentials.
    fn authorized<T>(&self, message: T) -> Result<tonic::Request<T>, WarehouseError> {
        let mut request = tonic::Request::new(message);

        let value = MetadataValue::try_from(format!("Bearer {}", self.token))
            .map_err(|e| WarehouseError::Auth(format!("invalid token: {e}")))?;
        request.metadata_mut().insert("authorization", value);

        if let Some(project_id) = &self.project_id {
            let value = MetadataValue::try_from(project_id.as_str())
                .map_err(|e| WarehouseError::Config(format!("invalid project id: {e}")))?;
            request.metadata_mut().insert(PROJECT_ID_HEADER, value);
        }

        Ok(request)
    }
}

#[async_trait]
impl EventSource for FlightSqlSession {
    async fn fetch(&mut self, query: &str) -> Result<Vec<RecordBatch>, WarehouseError> {
        tracing::debug!(endpoint = %self.endpoint_url, "Executing warehouse query");

        let flight_info = self
            .client
            .execute(query.to_string(), None)
            .await
            .map_err(WarehouseError::from_arrow)?;

        let mut batches = Vec::new();
        for endpoint in flight_info.endpoint {
            let ticket = endpoint
                .ticket
                .ok_or_else(|| WarehouseError::Query("flight endpoint without ticket".into()))?;

            let stream = self
                .client
                .do_get(ticket)
                .await
                .map_err(WarehouseError::from_arrow)?;
            let mut part: Vec<RecordBatch> = stream
                .try_collect()
                .await
                .map_err(|e| WarehouseError::Query(e.to_string()))?;
            batches.append(&mut part);
        }

        tracing::info!(
            batches = batches.len(),
            rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "Fetched warehouse result set"
        );
        Ok(batches)
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let request = self.authorized(Action {
            r#type: CLOSE_SESSION.to_string(),
            body: Bytes::new(),
        })?;
        match self.client.inner_mut().do_action(request).await {
            Ok(_) => tracing::info!(endpoint = %self.endpoint_url, "Closed warehouse session"),
            // Servers without session support reject the action; the channel
            // is released when the session is dropped either way
            Err(e) => tracing::debug!(error = %e, "Warehouse did not accept CloseSession"),
        }
        Ok(())
    }
}
