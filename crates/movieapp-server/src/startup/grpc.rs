//! gRPC server startup
//!
//! Every service listens on its own port behind the admission layer. With TLS
//! enabled the server requires client certificates signed by the shared CA,
//! and the movie service dials its dependencies with its own certificate.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower::ServiceBuilder;
use tracing::{error, info};

use movieapp_api::grpc::auth_service_server::AuthServiceServer;
use movieapp_api::grpc::metadata_service_server::MetadataServiceServer;
use movieapp_api::grpc::movie_service_server::MovieServiceServer;
use movieapp_api::grpc::rating_service_server::RatingServiceServer;
use movieapp_common::CancelSignal;
use movieapp_core::{
    AdmissionController, AuthGateway, ConnectionFactory, MemoryRegistry, MetadataGateway,
    RatingGateway, Registry, TransportCredentials,
};

use crate::model::config::{Configuration, ServiceKind};
use crate::model::tls::TlsMaterial;
use crate::service::auth::{AuthController, AuthHandler};
use crate::service::metadata::{MetadataController, MetadataHandler};
use crate::service::movie::{MovieController, MovieHandler};
use crate::service::rating::{RatingController, RatingHandler};

/// Everything a service needs from the hosting process
#[derive(Clone)]
pub struct ServiceContext {
    pub configuration: Configuration,
    pub registry: Arc<MemoryRegistry>,
    pub tls: Option<TlsMaterial>,
    pub shutdown: CancelSignal,
}

/// A server task and the address it is bound to
pub struct RunningService {
    pub kind: ServiceKind,
    pub address: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// Bind the listener, build the handler and serve until shutdown
pub async fn start_service(
    kind: ServiceKind,
    context: &ServiceContext,
) -> anyhow::Result<RunningService> {
    let configuration = &context.configuration;
    let bind_address: SocketAddr = format!(
        "{}:{}",
        configuration.server_address(),
        configuration.service_port(kind)
    )
    .parse()?;

    let listener = TcpListener::bind(bind_address).await?;
    let address = listener.local_addr()?;

    let admission_config = configuration.admission_config(kind);
    let admission = AdmissionController::new(kind.name(), admission_config);
    let layer = ServiceBuilder::new().layer(admission.layer()).into_inner();

    let mut builder = Server::builder();
    if let Some(tls) = &context.tls {
        info!("{} gRPC server starting with mutual TLS", kind.name());
        builder = builder.tls_config(tls.server_tls_config(kind.name()).await?)?;
    }
    let mut builder = builder.layer(layer);

    let router = match kind {
        ServiceKind::Metadata => builder.add_service(MetadataServiceServer::new(
            MetadataHandler::new(MetadataController::in_memory()),
        )),
        ServiceKind::Rating => builder.add_service(RatingServiceServer::new(RatingHandler::new(
            RatingController::in_memory(),
        ))),
        ServiceKind::Auth => builder.add_service(AuthServiceServer::new(AuthHandler::new(
            Arc::new(AuthController::from_configuration(configuration)),
        ))),
        ServiceKind::Movie => {
            builder.add_service(MovieServiceServer::new(movie_handler(context).await?))
        }
    };

    info!(
        "Starting {} gRPC server on {} (admission capacity {}, refill {}/s)",
        kind.name(),
        address,
        admission_config.capacity,
        admission_config.refill_per_second
    );

    let shutdown = context.shutdown.clone();
    let handle = tokio::spawn(async move {
        let incoming = TcpListenerStream::new(listener);
        let result = router
            .serve_with_incoming_shutdown(incoming, async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("{} gRPC server error: {}", kind.name(), e);
        }
    });

    Ok(RunningService {
        kind,
        address,
        handle,
    })
}

async fn movie_handler(context: &ServiceContext) -> anyhow::Result<MovieHandler> {
    let configuration = &context.configuration;
    let credentials = match &context.tls {
        Some(tls) => tls.client_credentials(ServiceKind::Movie.name()).await?,
        None => TransportCredentials::Insecure,
    };

    let registry: Arc<dyn Registry> = context.registry.clone();
    let connections = ConnectionFactory::new(registry, credentials);
    let retry = configuration.retry_policy();

    let controller = MovieController::new(
        Arc::new(MetadataGateway::new(connections.clone(), retry.clone())),
        Arc::new(RatingGateway::new(connections.clone(), retry.clone())),
    );
    let handler = MovieHandler::new(controller, context.shutdown.clone());

    if configuration.movie_auth_required() {
        info!("movie service requires bearer tokens");
        return Ok(handler.with_validator(Arc::new(AuthGateway::new(connections, retry))));
    }
    Ok(handler)
}
