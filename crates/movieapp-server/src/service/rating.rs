//! Rating service: stores individual ratings, serves their average

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tonic::{Request, Response, Status};
use tracing::debug;

use movieapp_api::grpc::rating_service_server::RatingService;
use movieapp_api::grpc::{
    GetAggregatedRatingRequest, GetAggregatedRatingResponse, PutRatingRequest, PutRatingResponse,
};
use movieapp_api::{Rating, RecordId, RecordType};
use movieapp_common::{MovieAppError, RATING_SERVICE, Result};

use super::status;

#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// All ratings of a record; `NotFound` when there are none
    async fn get(&self, record_id: &RecordId, record_type: &RecordType) -> Result<Vec<Rating>>;

    async fn put(&self, rating: Rating) -> Result<()>;
}

/// Ratings kept in memory, grouped by record
#[derive(Debug, Default)]
pub struct MemoryRatingRepository {
    ratings: DashMap<(RecordType, RecordId), Vec<Rating>>,
}

impl MemoryRatingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RatingRepository for MemoryRatingRepository {
    async fn get(&self, record_id: &RecordId, record_type: &RecordType) -> Result<Vec<Rating>> {
        self.ratings
            .get(&(record_type.clone(), record_id.clone()))
            .map(|ratings| ratings.clone())
            .filter(|ratings| !ratings.is_empty())
            .ok_or_else(|| {
                MovieAppError::NotFound(format!("no ratings for {} {}", record_type, record_id))
            })
    }

    async fn put(&self, rating: Rating) -> Result<()> {
        self.ratings
            .entry((rating.record_type.clone(), rating.record_id.clone()))
            .or_default()
            .push(rating);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RatingController {
    repository: Arc<dyn RatingRepository>,
}

impl RatingController {
    pub fn new(repository: Arc<dyn RatingRepository>) -> Self {
        Self { repository }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRatingRepository::new()))
    }

    /// Mean of every rating of the record
    pub async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
    ) -> Result<f64> {
        let ratings = self.repository.get(record_id, record_type).await?;
        let sum: f64 = ratings.iter().map(|r| f64::from(r.value)).sum();
        Ok(sum / ratings.len() as f64)
    }

    pub async fn put_rating(&self, rating: Rating) -> Result<()> {
        if rating.record_id.is_empty() || rating.record_type.is_empty() || rating.user_id.is_empty()
        {
            return Err(MovieAppError::InvalidArgument(
                "user id, record id and record type are required".to_string(),
            ));
        }
        debug!(
            "Storing rating {} of {} {} by {}",
            rating.value, rating.record_type, rating.record_id, rating.user_id
        );
        self.repository.put(rating).await
    }
}

pub struct RatingHandler {
    controller: RatingController,
}

impl RatingHandler {
    pub fn new(controller: RatingController) -> Self {
        Self { controller }
    }
}

#[tonic::async_trait]
impl RatingService for RatingHandler {
    async fn get_aggregated_rating(
        &self,
        request: Request<GetAggregatedRatingRequest>,
    ) -> std::result::Result<Response<GetAggregatedRatingResponse>, Status> {
        const ENDPOINT: &str = "get_aggregated_rating";
        crate::metrics::record_request(RATING_SERVICE, ENDPOINT);

        let request = request.into_inner();
        let record_id = RecordId::new(request.record_id);
        let record_type = RecordType::new(request.record_type);
        if record_id.is_empty() || record_type.is_empty() {
            return Err(status(
                RATING_SERVICE,
                ENDPOINT,
                MovieAppError::InvalidArgument("record id and record type are required".to_string()),
            ));
        }

        let rating_value = self
            .controller
            .get_aggregated_rating(&record_id, &record_type)
            .await
            .map_err(|e| status(RATING_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(GetAggregatedRatingResponse { rating_value }))
    }

    async fn put_rating(
        &self,
        request: Request<PutRatingRequest>,
    ) -> std::result::Result<Response<PutRatingResponse>, Status> {
        const ENDPOINT: &str = "put_rating";
        crate::metrics::record_request(RATING_SERVICE, ENDPOINT);

        self.controller
            .put_rating(Rating::from(request.into_inner()))
            .await
            .map_err(|e| status(RATING_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(PutRatingResponse {}))
    }
}
