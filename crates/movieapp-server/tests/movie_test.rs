// Integration tests for the movie aggregator and the full service set
// Aggregation rules are checked against in-process fakes; the end-to-end
// tests start every service on loopback ports sharing one registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use config::Config;
use tonic::Request;

use movieapp_api::grpc::auth_service_client::AuthServiceClient;
use movieapp_api::grpc::metadata_service_client::MetadataServiceClient;
use movieapp_api::grpc::movie_service_client::MovieServiceClient;
use movieapp_api::grpc::rating_service_client::RatingServiceClient;
use movieapp_api::grpc::movie_service_server::MovieService;
use movieapp_api::grpc::{
    GetMetadataRequest, GetMovieDetailsRequest, GetTokenRequest, PutMetadataRequest,
    PutRatingRequest,
};
use movieapp_api::{Metadata, RecordId, RecordType};
use movieapp_common::{CancelSignal, Code, MovieAppError, Result};
use movieapp_server::model::config::{Configuration, ServiceKind};
use movieapp_server::service::movie::{
    MetadataLookup, MovieController, MovieHandler, RatingLookup, TokenValidator,
};
use movieapp_server::startup::Application;

// ============== Fakes ==============

struct FakeMetadata(Result<Metadata>);

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn metadata(&self, _id: &str, _signal: &CancelSignal) -> Result<Metadata> {
        self.0.clone()
    }
}

struct FakeRating {
    result: Result<f64>,
    calls: AtomicU32,
}

impl FakeRating {
    fn new(result: Result<f64>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RatingLookup for FakeRating {
    async fn aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        _signal: &CancelSignal,
    ) -> Result<f64> {
        assert_eq!(record_type, &RecordType::movie());
        assert!(!record_id.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

struct FakeValidator;

#[async_trait]
impl TokenValidator for FakeValidator {
    async fn validate(&self, token: &str, _signal: &CancelSignal) -> Result<String> {
        if token == "good" {
            Ok("alice".to_string())
        } else {
            Err(MovieAppError::Unauthenticated("bad token".to_string()))
        }
    }
}

fn metadata(id: &str) -> Metadata {
    Metadata {
        id: id.to_string(),
        title: "Paris, Texas".to_string(),
        description: "A man wanders out of the desert".to_string(),
        director: "Wenders".to_string(),
    }
}

fn controller(metadata: Result<Metadata>, rating: Arc<FakeRating>) -> MovieController {
    MovieController::new(Arc::new(FakeMetadata(metadata)), rating)
}

// ============== Aggregation rules ==============

#[tokio::test]
async fn test_details_with_rating() {
    let controller = controller(Ok(metadata("1")), FakeRating::new(Ok(4.25)));

    let details = controller.get("1", &CancelSignal::new()).await.unwrap();
    assert_eq!(details.metadata, metadata("1"));
    assert_eq!(details.rating, Some(4.25));
}

#[tokio::test]
async fn test_missing_rating_is_omitted() {
    let rating = FakeRating::new(Err(MovieAppError::NotFound("no ratings".to_string())));
    let controller = controller(Ok(metadata("1")), rating.clone());

    let details = controller.get("1", &CancelSignal::new()).await.unwrap();
    assert_eq!(details.metadata.title, "Paris, Texas");
    assert!(details.rating.is_none());
    assert_eq!(rating.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_metadata_fails_regardless_of_rating() {
    for rating in [
        Ok(3.0),
        Err(MovieAppError::NotFound("none".to_string())),
        Err(MovieAppError::Unavailable("down".to_string())),
    ] {
        let controller = controller(
            Err(MovieAppError::NotFound("no movie".to_string())),
            FakeRating::new(rating),
        );
        let err = controller.get("1", &CancelSignal::new()).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}

#[tokio::test]
async fn test_other_rating_failure_propagates() {
    let controller = controller(
        Ok(metadata("1")),
        FakeRating::new(Err(MovieAppError::Unavailable("rating down".to_string()))),
    );

    let err = controller.get("1", &CancelSignal::new()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_empty_id_is_invalid() {
    let rating = FakeRating::new(Ok(1.0));
    let controller = controller(Ok(metadata("1")), rating.clone());

    let err = controller.get("", &CancelSignal::new()).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(rating.calls.load(Ordering::SeqCst), 0);
}

// ============== Bearer authentication ==============

fn guarded_handler() -> MovieHandler {
    MovieHandler::new(
        controller(Ok(metadata("1")), FakeRating::new(Ok(5.0))),
        CancelSignal::new(),
    )
    .with_validator(Arc::new(FakeValidator))
}

fn details_request(id: &str, authorization: Option<&str>) -> Request<GetMovieDetailsRequest> {
    let mut request = Request::new(GetMovieDetailsRequest {
        movie_id: id.to_string(),
    });
    if let Some(value) = authorization {
        request
            .metadata_mut()
            .insert("authorization", value.parse().unwrap());
    }
    request
}

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let status = guarded_handler()
        .get_movie_details(details_request("1", None))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    let status = guarded_handler()
        .get_movie_details(details_request("1", Some("Basic abc")))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);
}

#[tokio::test]
async fn test_invalid_token_is_unauthenticated() {
    let status = guarded_handler()
        .get_movie_details(details_request("1", Some("Bearer bad")))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let response = guarded_handler()
        .get_movie_details(details_request("1", Some("Bearer good")))
        .await
        .unwrap()
        .into_inner();
    let details = response.movie_details.unwrap();
    assert_eq!(details.rating, Some(5.0));
}

// ============== Cancellation ==============

/// Sets the flag when dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never answers until the signal fires
struct StalledMetadata {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl MetadataLookup for StalledMetadata {
    async fn metadata(&self, id: &str, signal: &CancelSignal) -> Result<Metadata> {
        let _flag = DropFlag(self.dropped.clone());
        signal.cancelled().await;
        Err(MovieAppError::Cancelled(format!("lookup of {} cancelled", id)))
    }
}

fn stalled_handler(shutdown: CancelSignal) -> (MovieHandler, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let controller = MovieController::new(
        Arc::new(StalledMetadata {
            dropped: dropped.clone(),
        }),
        FakeRating::new(Ok(1.0)),
    );
    (MovieHandler::new(controller, shutdown), dropped)
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_lookup() {
    let shutdown = CancelSignal::new();
    let (handler, _) = stalled_handler(shutdown.clone());

    let call = tokio::spawn(async move {
        handler
            .get_movie_details(details_request("1", None))
            .await
            .map(|_| ())
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.cancel();

    let status = call.await.unwrap().unwrap_err();
    assert_eq!(status.code(), tonic::Code::Cancelled);
}

#[tokio::test]
async fn test_dropped_request_abandons_lookup() {
    let shutdown = CancelSignal::new();
    let (handler, dropped) = stalled_handler(shutdown.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(20),
        handler.get_movie_details(details_request("1", None)),
    )
    .await;

    assert!(result.is_err());
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!shutdown.is_cancelled());
}

// ============== End to end ==============

fn loopback_configuration(overrides: &[(&str, &str)]) -> Configuration {
    let mut builder = Config::builder()
        .set_override("server.address", "127.0.0.1")
        .unwrap()
        .set_override("auth.secret", "end-to-end-test-secret-value")
        .unwrap();
    for kind in ServiceKind::ALL {
        builder = builder
            .set_override(format!("{}.port", kind.name()), 0_i64)
            .unwrap();
    }
    for (key, value) in overrides {
        builder = builder.set_override(*key, *value).unwrap();
    }
    Configuration::from_config(builder.build().unwrap())
}

fn endpoint(app: &Application, kind: ServiceKind) -> String {
    format!("http://{}", app.address(kind).unwrap())
}

#[tokio::test]
async fn test_all_services_end_to_end() {
    let app = Application::start(
        &ServiceKind::ALL,
        loopback_configuration(&[]),
        CancelSignal::new(),
    )
    .await
    .unwrap();

    let mut metadata_client = MetadataServiceClient::connect(endpoint(&app, ServiceKind::Metadata))
        .await
        .unwrap();
    metadata_client
        .put_metadata(PutMetadataRequest {
            metadata: Some(metadata("tt0087884").into()),
        })
        .await
        .unwrap();

    let mut movie_client = MovieServiceClient::connect(endpoint(&app, ServiceKind::Movie))
        .await
        .unwrap();

    // No ratings yet: details come back without a rating
    let details = movie_client
        .get_movie_details(GetMovieDetailsRequest {
            movie_id: "tt0087884".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .movie_details
        .unwrap();
    assert_eq!(details.metadata.unwrap().director, "Wenders");
    assert!(details.rating.is_none());

    let mut rating_client = RatingServiceClient::connect(endpoint(&app, ServiceKind::Rating))
        .await
        .unwrap();
    for (user, value) in [("alice", 5), ("bob", 4)] {
        rating_client
            .put_rating(PutRatingRequest {
                user_id: user.to_string(),
                record_id: "tt0087884".to_string(),
                record_type: RecordType::MOVIE.to_string(),
                rating_value: value,
            })
            .await
            .unwrap();
    }

    let details = movie_client
        .get_movie_details(GetMovieDetailsRequest {
            movie_id: "tt0087884".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .movie_details
        .unwrap();
    assert_eq!(details.rating, Some(4.5));

    let status = movie_client
        .get_movie_details(GetMovieDetailsRequest {
            movie_id: "unknown".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_movie_requires_token_when_configured() {
    let configuration = loopback_configuration(&[("movie.auth_required", "true")]);
    let app = Application::start(&ServiceKind::ALL, configuration, CancelSignal::new())
        .await
        .unwrap();

    let mut metadata_client = MetadataServiceClient::connect(endpoint(&app, ServiceKind::Metadata))
        .await
        .unwrap();
    metadata_client
        .put_metadata(PutMetadataRequest {
            metadata: Some(metadata("42").into()),
        })
        .await
        .unwrap();

    let mut movie_client = MovieServiceClient::connect(endpoint(&app, ServiceKind::Movie))
        .await
        .unwrap();
    let status = movie_client
        .get_movie_details(GetMovieDetailsRequest {
            movie_id: "42".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    let mut auth_client = AuthServiceClient::connect(endpoint(&app, ServiceKind::Auth))
        .await
        .unwrap();
    let token = auth_client
        .get_token(GetTokenRequest {
            username: "alice".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .token;

    let details = movie_client
        .get_movie_details(details_request("42", Some(&format!("Bearer {}", token))))
        .await
        .unwrap()
        .into_inner()
        .movie_details
        .unwrap();
    assert_eq!(details.metadata.unwrap().id, "42");

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_admission_rejects_over_capacity() {
    let configuration = loopback_configuration(&[
        ("admission.capacity", "2"),
        ("admission.refill_per_second", "0"),
    ]);
    let app = Application::start(&[ServiceKind::Metadata], configuration, CancelSignal::new())
        .await
        .unwrap();

    let mut client = MetadataServiceClient::connect(endpoint(&app, ServiceKind::Metadata))
        .await
        .unwrap();
    let request = || GetMetadataRequest {
        movie_id: "nothing".to_string(),
    };

    for _ in 0..2 {
        let status = client.get_metadata(request()).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }
    let status = client.get_metadata(request()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::ResourceExhausted);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_deregisters_instances() {
    let app = Application::start(
        &[ServiceKind::Rating],
        loopback_configuration(&[]),
        CancelSignal::new(),
    )
    .await
    .unwrap();
    let registry = app.registry();
    assert_eq!(registry.snapshot("rating").len(), 1);

    app.stop().await.unwrap();
    assert!(registry.snapshot("rating").is_empty());
}
