//! Auth service: issues and validates HS256 JWTs

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use movieapp_api::grpc::auth_service_server::AuthService;
use movieapp_api::grpc::{
    GetTokenRequest, GetTokenResponse, ValidateTokenRequest, ValidateTokenResponse,
};
use movieapp_common::{AUTH_SERVICE, MovieAppError, Result};

use super::status;
use crate::model::config::Configuration;

/// Validated tokens are remembered for this long
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthController {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expire_seconds: i64,
    validated: Cache<String, TokenClaims>,
}

impl AuthController {
    pub fn new(secret: &[u8], expire_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expire_seconds,
            validated: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(TOKEN_CACHE_TTL)
                .build(),
        }
    }

    /// Uses `auth.secret`, or a random per-process secret when unset
    pub fn from_configuration(configuration: &Configuration) -> Self {
        let expire_seconds = configuration.auth_token_expire_seconds();
        match configuration.auth_secret() {
            Some(secret) => Self::new(secret.as_bytes(), expire_seconds),
            None => {
                warn!("auth.secret is not set, tokens will not survive a restart");
                Self::new(&rand::random::<[u8; 32]>(), expire_seconds)
            }
        }
    }

    /// Any non-empty username/password pair is accepted
    pub fn get_token(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(MovieAppError::Unauthenticated(
                "invalid credentials".to_string(),
            ));
        }

        let iat = chrono::Utc::now().timestamp();
        let claims = TokenClaims {
            sub: username.to_string(),
            iat,
            exp: iat + self.expire_seconds,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| MovieAppError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Returns the token subject
    pub fn validate_token(&self, token: &str) -> Result<String> {
        if token.is_empty() {
            return Err(MovieAppError::Unauthenticated("missing token".to_string()));
        }

        if let Some(claims) = self.validated.get(token) {
            if claims.exp > chrono::Utc::now().timestamp() {
                return Ok(claims.sub);
            }
            self.validated.invalidate(token);
        }

        let data = decode::<TokenClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| MovieAppError::Unauthenticated(format!("invalid token: {}", e)))?;

        debug!("Validated token for {}", data.claims.sub);
        let subject = data.claims.sub.clone();
        self.validated.insert(token.to_string(), data.claims);
        Ok(subject)
    }
}

pub struct AuthHandler {
    controller: Arc<AuthController>,
}

impl AuthHandler {
    pub fn new(controller: Arc<AuthController>) -> Self {
        Self { controller }
    }
}

#[tonic::async_trait]
impl AuthService for AuthHandler {
    async fn get_token(
        &self,
        request: Request<GetTokenRequest>,
    ) -> std::result::Result<Response<GetTokenResponse>, Status> {
        const ENDPOINT: &str = "get_token";
        crate::metrics::record_request(AUTH_SERVICE, ENDPOINT);

        let request = request.into_inner();
        let token = self
            .controller
            .get_token(&request.username, &request.password)
            .map_err(|e| status(AUTH_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(GetTokenResponse { token }))
    }

    async fn validate_token(
        &self,
        request: Request<ValidateTokenRequest>,
    ) -> std::result::Result<Response<ValidateTokenResponse>, Status> {
        const ENDPOINT: &str = "validate_token";
        crate::metrics::record_request(AUTH_SERVICE, ENDPOINT);

        let username = self
            .controller
            .validate_token(&request.into_inner().token)
            .map_err(|e| status(AUTH_SERVICE, ENDPOINT, e))?;

        Ok(Response::new(ValidateTokenResponse { username }))
    }
}
