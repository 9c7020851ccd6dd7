//! Domain records and their gRPC conversions

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::grpc;

/// Movie metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub title: String,
    pub description: String,
    pub director: String,
}

impl From<grpc::Metadata> for Metadata {
    fn from(value: grpc::Metadata) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            director: value.director,
        }
    }
}

impl From<Metadata> for grpc::Metadata {
    fn from(value: Metadata) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            director: value.director,
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a rated record
    RecordId
);
string_id!(
    /// Kind of a rated record, e.g. `movie`
    RecordType
);
string_id!(UserId);

impl RecordType {
    pub const MOVIE: &'static str = "movie";

    pub fn movie() -> Self {
        Self::new(Self::MOVIE)
    }
}

/// A single user's rating of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub record_id: RecordId,
    pub record_type: RecordType,
    pub user_id: UserId,
    pub value: i32,
}

impl From<grpc::PutRatingRequest> for Rating {
    fn from(value: grpc::PutRatingRequest) -> Self {
        Self {
            record_id: value.record_id.into(),
            record_type: value.record_type.into(),
            user_id: value.user_id.into(),
            value: value.rating_value,
        }
    }
}

impl From<Rating> for grpc::PutRatingRequest {
    fn from(value: Rating) -> Self {
        Self {
            user_id: value.user_id.to_string(),
            record_id: value.record_id.to_string(),
            record_type: value.record_type.to_string(),
            rating_value: value.value,
        }
    }
}

/// Movie details returned by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub metadata: Metadata,
}

impl From<MovieDetails> for grpc::MovieDetails {
    fn from(value: MovieDetails) -> Self {
        Self {
            rating: value.rating,
            metadata: Some(value.metadata.into()),
        }
    }
}

impl From<grpc::MovieDetails> for MovieDetails {
    fn from(value: grpc::MovieDetails) -> Self {
        Self {
            rating: value.rating,
            metadata: value.metadata.map(Metadata::from).unwrap_or_default(),
        }
    }
}
