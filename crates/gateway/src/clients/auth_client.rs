//! gRPC client for auth-service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use common::{AppError, AppResult, GrpcClientConfig};
use domain::IdentityResponse;
use proto::auth::{
    auth_service_client::AuthServiceClient as ProtoAuthServiceClient, AuthenticateRequest,
    ChangePasswordRequest, LoginRequest, LogoutRequest, RegisterRequest,
};

/// Issued access token as returned to HTTP clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    /// Signed access token
    #[schema(example = "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiIsImtpZCI6ImsxIn0...")]
    pub token: String,
    /// Always "Bearer"
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until the token expires
    #[schema(example = 900)]
    pub expires_in: i64,
}

/// Operations the gateway needs from the authentication backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> AppResult<IdentityResponse>;

    async fn login(&self, username: String, password: String) -> AppResult<TokenResponse>;

    /// Resolve a bearer token to its identity id
    async fn authenticate(&self, token: &str) -> AppResult<Uuid>;

    async fn logout(&self, token: &str) -> AppResult<()>;

    async fn change_password(
        &self,
        token: &str,
        old_password: String,
        new_password: String,
    ) -> AppResult<()>;
}

/// gRPC client wrapper for auth-service.
pub struct AuthClient {
    client: ProtoAuthServiceClient<Channel>,
}

impl AuthClient {
    /// Create a client for auth-service. The channel connects on first use
    /// and reconnects on its own.
    pub fn connect(config: &GrpcClientConfig) -> Result<Self, tonic::transport::Error> {
        debug!("Connecting to auth-service at {}", config.endpoint);
        let channel = Endpoint::from_shared(config.endpoint.clone())?
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_lazy();

        Ok(Self {
            client: ProtoAuthServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn register(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> AppResult<IdentityResponse> {
        let request = tonic::Request::new(RegisterRequest {
            username,
            email,
            password,
        });

        let mut client = self.client.clone();
        let proto = client.register(request).await?.into_inner();

        Ok(IdentityResponse {
            id: proto.id.parse().map_err(|_| AppError::internal("Invalid UUID"))?,
            username: proto.username,
            email: proto.email,
            created_at: chrono::DateTime::parse_from_rfc3339(&proto.created_at)
                .map_err(|_| AppError::internal("Invalid date"))?
                .with_timezone(&chrono::Utc),
        })
    }

    async fn login(&self, username: String, password: String) -> AppResult<TokenResponse> {
        let request = tonic::Request::new(LoginRequest { username, password });

        let mut client = self.client.clone();
        let proto = client.login(request).await?.into_inner();

        Ok(TokenResponse {
            token: proto.access_token,
            token_type: proto.token_type,
            expires_in: proto.expires_in,
        })
    }

    async fn authenticate(&self, token: &str) -> AppResult<Uuid> {
        let request = tonic::Request::new(AuthenticateRequest {
            token: token.to_string(),
        });

        let mut client = self.client.clone();
        let proto = client.authenticate(request).await?.into_inner();

        proto
            .identity_id
            .parse()
            .map_err(|_| AppError::internal("Invalid UUID"))
    }

    async fn logout(&self, token: &str) -> AppResult<()> {
        let request = tonic::Request::new(LogoutRequest {
            token: token.to_string(),
        });

        let mut client = self.client.clone();
        client.logout(request).await?;
        Ok(())
    }

    async fn change_password(
        &self,
        token: &str,
        old_password: String,
        new_password: String,
    ) -> AppResult<()> {
        let request = tonic::Request::new(ChangePasswordRequest {
            token: token.to_string(),
            old_password,
            new_password,
        });

        let mut client = self.client.clone();
        client.change_password(request).await?;
        Ok(())
    }
}
