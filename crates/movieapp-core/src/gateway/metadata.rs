use tracing::debug;

use movieapp_api::Metadata;
use movieapp_api::grpc::metadata_service_client::MetadataServiceClient;
use movieapp_api::grpc::{GetMetadataRequest, PutMetadataRequest};
use movieapp_common::{CancelSignal, METADATA_SERVICE, MovieAppError, Result};

use crate::connection::ConnectionFactory;
use crate::retry::RetryPolicy;

/// Client-side access to the metadata service
#[derive(Clone)]
pub struct MetadataGateway {
    connections: ConnectionFactory,
    retry: RetryPolicy,
}

impl MetadataGateway {
    pub fn new(connections: ConnectionFactory, retry: RetryPolicy) -> Self {
        Self { connections, retry }
    }

    /// Fetch metadata for a movie
    pub async fn get(&self, id: &str, signal: &CancelSignal) -> Result<Metadata> {
        let address = self.connections.resolve(METADATA_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(METADATA_SERVICE, signal, move |_| self.get_once(address, id))
            .await
    }

    /// Store metadata for a movie
    pub async fn put(&self, metadata: Metadata, signal: &CancelSignal) -> Result<()> {
        let address = self.connections.resolve(METADATA_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(METADATA_SERVICE, signal, move |_| {
                self.put_once(address, metadata.clone())
            })
            .await
    }

    async fn get_once(&self, address: &str, id: &str) -> Result<Metadata> {
        let channel = self.connections.dial(address).await?;
        let mut client = MetadataServiceClient::new(channel);

        let response = client
            .get_metadata(GetMetadataRequest {
                movie_id: id.to_string(),
            })
            .await?;
        debug!("Fetched metadata for {}", id);

        response
            .into_inner()
            .metadata
            .map(Metadata::from)
            .ok_or_else(|| MovieAppError::Internal(format!("empty metadata for {}", id)))
    }

    async fn put_once(&self, address: &str, metadata: Metadata) -> Result<()> {
        let channel = self.connections.dial(address).await?;
        let mut client = MetadataServiceClient::new(channel);

        client
            .put_metadata(PutMetadataRequest {
                metadata: Some(metadata.into()),
            })
            .await?;
        Ok(())
    }
}
