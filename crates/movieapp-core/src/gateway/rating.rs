use movieapp_api::grpc::rating_service_client::RatingServiceClient;
use movieapp_api::grpc::{GetAggregatedRatingRequest, PutRatingRequest};
use movieapp_api::{Rating, RecordId, RecordType};
use movieapp_common::{CancelSignal, RATING_SERVICE, Result};

use crate::connection::ConnectionFactory;
use crate::retry::RetryPolicy;

/// Client-side access to the rating service
#[derive(Clone)]
pub struct RatingGateway {
    connections: ConnectionFactory,
    retry: RetryPolicy,
}

impl RatingGateway {
    pub fn new(connections: ConnectionFactory, retry: RetryPolicy) -> Self {
        Self { connections, retry }
    }

    /// Average rating of a record. `NotFound` when it has no ratings.
    pub async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        signal: &CancelSignal,
    ) -> Result<f64> {
        let address = self.connections.resolve(RATING_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(RATING_SERVICE, signal, move |_| {
                self.get_aggregated_rating_once(address, record_id, record_type)
            })
            .await
    }

    pub async fn put_rating(&self, rating: Rating, signal: &CancelSignal) -> Result<()> {
        let address = self.connections.resolve(RATING_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(RATING_SERVICE, signal, move |_| {
                self.put_rating_once(address, rating.clone())
            })
            .await
    }

    async fn get_aggregated_rating_once(
        &self,
        address: &str,
        record_id: &RecordId,
        record_type: &RecordType,
    ) -> Result<f64> {
        let channel = self.connections.dial(address).await?;
        let mut client = RatingServiceClient::new(channel);

        let response = client
            .get_aggregated_rating(GetAggregatedRatingRequest {
                record_id: record_id.to_string(),
                record_type: record_type.to_string(),
            })
            .await?;
        Ok(response.into_inner().rating_value)
    }

    async fn put_rating_once(&self, address: &str, rating: Rating) -> Result<()> {
        let channel = self.connections.dial(address).await?;
        let mut client = RatingServiceClient::new(channel);

        client.put_rating(PutRatingRequest::from(rating)).await?;
        Ok(())
    }
}
