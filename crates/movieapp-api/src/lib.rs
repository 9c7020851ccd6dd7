//! movieapp API - gRPC schema and domain models
//!
//! - `grpc`: messages, clients and servers generated from `proto/movieapp.proto`
//! - `model`: domain records exchanged between controllers and gateways

pub mod model;

#[allow(clippy::all)]
pub mod grpc {
    tonic::include_proto!("movieapp");
}

pub use model::{Metadata, MovieDetails, Rating, RecordId, RecordType, UserId};
