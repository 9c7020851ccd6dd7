// Integration tests for the gateways
// Runs real loopback gRPC servers that fail on demand and counts the attempts

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use movieapp_api::grpc::metadata_service_server::{MetadataService, MetadataServiceServer};
use movieapp_api::grpc::rating_service_server::{RatingService, RatingServiceServer};
use movieapp_api::grpc::{
    GetAggregatedRatingRequest, GetAggregatedRatingResponse, GetMetadataRequest,
    GetMetadataResponse, PutMetadataRequest, PutMetadataResponse, PutRatingRequest,
    PutRatingResponse,
};
use async_trait::async_trait;
use movieapp_api::{Metadata, RecordId, RecordType};
use movieapp_common::{CancelSignal, Code, MovieAppError};
use movieapp_core::{
    AuthGateway, ConnectionError, ConnectionFactory, MemoryRegistry, MetadataGateway,
    RatingGateway, Registry, RetryPolicy, TransportCredentials,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

// ============== Fake servers ==============

/// Fails the first `failures` calls with `code`, then succeeds
struct FlakyMetadata {
    calls: Arc<AtomicU32>,
    failures: u32,
    code: tonic::Code,
}

#[tonic::async_trait]
impl MetadataService for FlakyMetadata {
    async fn get_metadata(
        &self,
        request: Request<GetMetadataRequest>,
    ) -> Result<Response<GetMetadataResponse>, Status> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(Status::new(self.code, "injected failure"));
        }

        let id = request.into_inner().movie_id;
        Ok(Response::new(GetMetadataResponse {
            metadata: Some(
                Metadata {
                    id,
                    title: "Stalker".to_string(),
                    description: String::new(),
                    director: "Tarkovsky".to_string(),
                }
                .into(),
            ),
        }))
    }

    async fn put_metadata(
        &self,
        _request: Request<PutMetadataRequest>,
    ) -> Result<Response<PutMetadataResponse>, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(PutMetadataResponse {}))
    }
}

struct FixedRating {
    calls: Arc<AtomicU32>,
    result: Result<f64, tonic::Code>,
}

#[tonic::async_trait]
impl RatingService for FixedRating {
    async fn get_aggregated_rating(
        &self,
        _request: Request<GetAggregatedRatingRequest>,
    ) -> Result<Response<GetAggregatedRatingResponse>, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.result {
            Ok(rating_value) => Ok(Response::new(GetAggregatedRatingResponse { rating_value })),
            Err(code) => Err(Status::new(code, "injected failure")),
        }
    }

    async fn put_rating(
        &self,
        _request: Request<PutRatingRequest>,
    ) -> Result<Response<PutRatingResponse>, Status> {
        Ok(Response::new(PutRatingResponse {}))
    }
}

async fn serve_metadata(service: FlakyMetadata) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(MetadataServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

async fn serve_rating(service: FixedRating) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(RatingServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

fn factory_for(service: &str, addr: SocketAddr) -> ConnectionFactory {
    let registry = Arc::new(MemoryRegistry::new());
    registry.pin(service, &addr.to_string());
    ConnectionFactory::new(registry, TransportCredentials::Insecure)
}

// ============== Retry behaviour ==============

#[tokio::test]
async fn test_transient_failure_uses_every_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: u32::MAX,
        code: tonic::Code::Unavailable,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();

    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_non_transient_failure_single_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: u32::MAX,
        code: tonic::Code::NotFound,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();

    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: 2,
        code: tonic::Code::ResourceExhausted,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());

    let metadata = gateway.get("tt0079944", &CancelSignal::new()).await.unwrap();

    assert_eq!(metadata.id, "tt0079944");
    assert_eq!(metadata.director, "Tarkovsky");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unmapped_code_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: u32::MAX,
        code: tonic::Code::DataLoss,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_put_reaches_server() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: 0,
        code: tonic::Code::Ok,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());

    gateway
        .put(Metadata::default(), &CancelSignal::new())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============== Rating gateway ==============

#[tokio::test]
async fn test_rating_value_returned() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_rating(FixedRating {
        calls: calls.clone(),
        result: Ok(4.5),
    })
    .await;
    let gateway = RatingGateway::new(factory_for("rating", addr), RetryPolicy::default());

    let rating = gateway
        .get_aggregated_rating(&RecordId::new("1"), &RecordType::movie(), &CancelSignal::new())
        .await
        .unwrap();
    assert_eq!(rating, 4.5);
}

#[tokio::test]
async fn test_rating_not_found_keeps_classification() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_rating(FixedRating {
        calls: calls.clone(),
        result: Err(tonic::Code::NotFound),
    })
    .await;
    let gateway = RatingGateway::new(factory_for("rating", addr), RetryPolicy::default());

    let err = gateway
        .get_aggregated_rating(&RecordId::new("1"), &RecordType::movie(), &CancelSignal::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============== Resolution and cancellation ==============

/// Registry whose lookups always fail with `code`, counting each lookup
struct FailingRegistry {
    lookups: AtomicU32,
    code: Code,
}

impl FailingRegistry {
    fn new(code: Code) -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicU32::new(0),
            code,
        })
    }
}

#[async_trait]
impl Registry for FailingRegistry {
    async fn register(&self, _: &str, _: &str, _: &str) -> movieapp_common::Result<()> {
        Ok(())
    }

    async fn deregister(&self, _: &str, _: &str) -> movieapp_common::Result<()> {
        Ok(())
    }

    async fn addresses(&self, service_name: &str) -> movieapp_common::Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Err(MovieAppError::new(self.code, format!("lookup of {} failed", service_name)))
    }

    async fn report_healthy(&self, _: &str, _: &str) -> movieapp_common::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_empty_registry_fails_without_remote_attempt() {
    let registry = Arc::new(MemoryRegistry::new());
    let factory = ConnectionFactory::new(registry, TransportCredentials::Insecure);
    let gateway = MetadataGateway::new(factory.clone(), RetryPolicy::default());

    let err = factory.connect("metadata").await.unwrap_err();
    assert!(matches!(err, ConnectionError::Resolution { .. }));

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn test_unknown_service_resolved_once() {
    let registry = FailingRegistry::new(Code::NotFound);
    let factory = ConnectionFactory::new(registry.clone(), TransportCredentials::Insecure);
    let gateway = MetadataGateway::new(factory, RetryPolicy::default());

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();

    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_registry_fails_fast() {
    let registry = FailingRegistry::new(Code::Unavailable);
    let factory = ConnectionFactory::new(registry.clone(), TransportCredentials::Insecure);
    let rating = RatingGateway::new(factory.clone(), RetryPolicy::default());
    let auth = AuthGateway::new(factory, RetryPolicy::default());

    let err = rating
        .get_aggregated_rating(&RecordId::new("1"), &RecordType::movie(), &CancelSignal::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);

    let err = auth
        .validate_token("token", &CancelSignal::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_instance_is_retried() {
    // Bind then drop a listener so nothing accepts on that port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let gateway = MetadataGateway::new(
        factory_for("metadata", addr),
        RetryPolicy::with_max_attempts(2),
    );

    let err = gateway.get("1", &CancelSignal::new()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_cancelled_call_makes_no_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let addr = serve_metadata(FlakyMetadata {
        calls: calls.clone(),
        failures: 0,
        code: tonic::Code::Ok,
    })
    .await;
    let gateway = MetadataGateway::new(factory_for("metadata", addr), RetryPolicy::default());
    let signal = CancelSignal::new();
    signal.cancel();

    let err = gateway.get("1", &signal).await.unwrap_err();

    assert_eq!(err.code(), Code::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
