//! Metadata service: cache-aside reads over an in-memory store

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use movieapp_api::Metadata;
use movieapp_api::grpc::metadata_service_server::MetadataService;
use movieapp_api::grpc::{
    GetMetadataRequest, GetMetadataResponse, PutMetadataRequest, PutMetadataResponse,
};
use movieapp_common::{METADATA_SERVICE, MovieAppError, Result};
use movieapp_core::{CacheAside, MemoryCache, MemoryRepository};

use super::status;

#[derive(Clone)]
pub struct MetadataController {
    records: CacheAside<Metadata>,
}

impl MetadataController {
    pub fn new(records: CacheAside<Metadata>) -> Self {
        Self { records }
    }

    /// Controller over an in-memory store and cache
    pub fn in_memory() -> Self {
        Self::new(CacheAside::new(
            METADATA_SERVICE,
            Arc::new(MemoryCache::<Metadata>::new()),
            Arc::new(MemoryRepository::<Metadata>::new()),
        ))
    }

    pub async fn get(&self, id: &str) -> Result<Metadata> {
        if id.is_empty() {
            return Err(MovieAppError::InvalidArgument(
                "movie id must not be empty".to_string(),
            ));
        }
        self.records.get(id).await
    }

    /// Store only; a cached copy is left untouched
    pub async fn put(&self, metadata: Metadata) -> Result<()> {
        if metadata.id.is_empty() {
            return Err(MovieAppError::InvalidArgument(
                "metadata id must not be empty".to_string(),
            ));
        }
        debug!("Storing metadata for {}", metadata.id);
        self.records.put(metadata).await
    }
}

pub struct MetadataHandler {
    controller: MetadataController,
}

impl MetadataHandler {
    pub fn new(controller: MetadataController) -> Self {
        Self { controller }
    }
}

#[tonic::async_trait]
impl MetadataService for MetadataHandler {
    async fn get_metadata(
        &self,
        request: Request<GetMetadataRequest>,
    ) -> std::result::Result<Response<GetMetadataResponse>, Status> {
        const ENDPOINT: &str = "get_metadata";
        crate::metrics::record_request(METADATA_SERVICE, ENDPOINT);

        let id = request.into_inner().movie_id;
        let metadata = self
            .controller
            .get(&id)
            .await
            .map_err(|e| status(METADATA_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(GetMetadataResponse {
            metadata: Some(metadata.into()),
        }))
    }

    async fn put_metadata(
        &self,
        request: Request<PutMetadataRequest>,
    ) -> std::result::Result<Response<PutMetadataResponse>, Status> {
        const ENDPOINT: &str = "put_metadata";
        crate::metrics::record_request(METADATA_SERVICE, ENDPOINT);

        let metadata = request.into_inner().metadata.ok_or_else(|| {
            status(
                METADATA_SERVICE,
                ENDPOINT,
                MovieAppError::InvalidArgument("metadata is required".to_string()),
            )
        })?;
        self.controller
            .put(metadata.into())
            .await
            .map_err(|e| status(METADATA_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(PutMetadataResponse {}))
    }
}
