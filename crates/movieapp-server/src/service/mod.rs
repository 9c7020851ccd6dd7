//! gRPC service handlers and their controllers

pub mod auth;
pub mod metadata;
pub mod movie;
pub mod rating;

use tonic::Status;
use tracing::debug;

use movieapp_common::MovieAppError;

/// Count a failed request and convert it for the wire
pub(crate) fn status(service: &'static str, endpoint: &'static str, err: MovieAppError) -> Status {
    debug!("{}.{} failed: {}", service, endpoint, err);
    crate::metrics::record_error(service, endpoint, err.code());
    err.into()
}
