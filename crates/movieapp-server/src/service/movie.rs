//! Movie service: aggregates metadata and rating from downstream services
//!
//! Metadata is mandatory. A movie without ratings is still returned, just
//! without a rating value; any other rating failure fails the call.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Request, Response, Status};

use movieapp_api::grpc::movie_service_server::MovieService;
use movieapp_api::grpc::{GetMovieDetailsRequest, GetMovieDetailsResponse};
use movieapp_api::{Metadata, MovieDetails, RecordId, RecordType};
use movieapp_common::{CancelSignal, MOVIE_SERVICE, MovieAppError, Result};
use movieapp_core::{AuthGateway, MetadataGateway, RatingGateway};

use super::status;

pub const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn metadata(&self, id: &str, signal: &CancelSignal) -> Result<Metadata>;
}

#[async_trait]
pub trait RatingLookup: Send + Sync {
    async fn aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        signal: &CancelSignal,
    ) -> Result<f64>;
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Subject of a valid token
    async fn validate(&self, token: &str, signal: &CancelSignal) -> Result<String>;
}

#[async_trait]
impl MetadataLookup for MetadataGateway {
    async fn metadata(&self, id: &str, signal: &CancelSignal) -> Result<Metadata> {
        self.get(id, signal).await
    }
}

#[async_trait]
impl RatingLookup for RatingGateway {
    async fn aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        signal: &CancelSignal,
    ) -> Result<f64> {
        self.get_aggregated_rating(record_id, record_type, signal)
            .await
    }
}

#[async_trait]
impl TokenValidator for AuthGateway {
    async fn validate(&self, token: &str, signal: &CancelSignal) -> Result<String> {
        self.validate_token(token, signal).await
    }
}

#[derive(Clone)]
pub struct MovieController {
    metadata: Arc<dyn MetadataLookup>,
    rating: Arc<dyn RatingLookup>,
}

impl MovieController {
    pub fn new(metadata: Arc<dyn MetadataLookup>, rating: Arc<dyn RatingLookup>) -> Self {
        Self { metadata, rating }
    }

    /// Fetch metadata and rating concurrently. A metadata failure wins over
    /// any rating outcome.
    pub async fn get(&self, id: &str, signal: &CancelSignal) -> Result<MovieDetails> {
        if id.is_empty() {
            return Err(MovieAppError::InvalidArgument(
                "movie id must not be empty".to_string(),
            ));
        }

        let record_id = RecordId::new(id);
        let record_type = RecordType::movie();
        let (metadata, rating) = tokio::join!(
            self.metadata.metadata(id, signal),
            self.rating
                .aggregated_rating(&record_id, &record_type, signal),
        );

        let metadata = metadata?;
        let rating = match rating {
            Ok(value) => Some(value),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        Ok(MovieDetails { rating, metadata })
    }
}

pub struct MovieHandler {
    controller: MovieController,
    /// Bearer tokens are required when set
    validator: Option<Arc<dyn TokenValidator>>,
    /// Process shutdown; client cancellation drops the handler future instead
    shutdown: CancelSignal,
}

impl MovieHandler {
    pub fn new(controller: MovieController, shutdown: CancelSignal) -> Self {
        Self {
            controller,
            validator: None,
            shutdown,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    async fn authenticate<T>(&self, request: &Request<T>) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        let token = request
            .metadata()
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .ok_or_else(|| MovieAppError::Unauthenticated("missing bearer token".to_string()))?;

        validator.validate(token, &self.shutdown).await?;
        Ok(())
    }
}

#[tonic::async_trait]
impl MovieService for MovieHandler {
    async fn get_movie_details(
        &self,
        request: Request<GetMovieDetailsRequest>,
    ) -> std::result::Result<Response<GetMovieDetailsResponse>, Status> {
        const ENDPOINT: &str = "get_movie_details";
        crate::metrics::record_request(MOVIE_SERVICE, ENDPOINT);

        self.authenticate(&request)
            .await
            .map_err(|e| status(MOVIE_SERVICE, ENDPOINT, e))?;

        let id = request.into_inner().movie_id;
        let details = self
            .controller
            .get(&id, &self.shutdown)
            .await
            .map_err(|e| status(MOVIE_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(GetMovieDetailsResponse {
            movie_details: Some(details.into()),
        }))
    }
}
