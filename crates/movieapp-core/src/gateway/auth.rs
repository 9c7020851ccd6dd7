use movieapp_api::grpc::auth_service_client::AuthServiceClient;
use movieapp_api::grpc::{GetTokenRequest, ValidateTokenRequest};
use movieapp_common::{AUTH_SERVICE, CancelSignal, Result};

use crate::connection::ConnectionFactory;
use crate::retry::RetryPolicy;

/// Client-side access to the auth service
#[derive(Clone)]
pub struct AuthGateway {
    connections: ConnectionFactory,
    retry: RetryPolicy,
}

impl AuthGateway {
    pub fn new(connections: ConnectionFactory, retry: RetryPolicy) -> Self {
        Self { connections, retry }
    }

    /// Exchange credentials for a signed token
    pub async fn get_token(
        &self,
        username: &str,
        password: &str,
        signal: &CancelSignal,
    ) -> Result<String> {
        let address = self.connections.resolve(AUTH_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(AUTH_SERVICE, signal, move |_| {
                self.get_token_once(address, username, password)
            })
            .await
    }

    /// Validate a token and return its subject
    pub async fn validate_token(&self, token: &str, signal: &CancelSignal) -> Result<String> {
        let address = self.connections.resolve(AUTH_SERVICE).await?;
        let address = address.as_str();
        self.retry
            .run(AUTH_SERVICE, signal, move |_| {
                self.validate_token_once(address, token)
            })
            .await
    }

    async fn get_token_once(
        &self,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let channel = self.connections.dial(address).await?;
        let mut client = AuthServiceClient::new(channel);

        let response = client
            .get_token(GetTokenRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        Ok(response.into_inner().token)
    }

    async fn validate_token_once(&self, address: &str, token: &str) -> Result<String> {
        let channel = self.connections.dial(address).await?;
        let mut client = AuthServiceClient::new(channel);

        let response = client
            .validate_token(ValidateTokenRequest {
                token: token.to_string(),
            })
            .await?;
        Ok(response.into_inner().username)
    }
}
