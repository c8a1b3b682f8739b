//! gRPC implementation for AuthService.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::service::AuthService;
use proto::auth::{
    auth_service_server::AuthService as AuthServiceProto, AuthenticateRequest,
    AuthenticateResponse, ChangePasswordRequest, ChangePasswordResponse, IdentityResponse,
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, RegisterRequest,
};

/// gRPC service wrapper for AuthService.
pub struct AuthGrpcService {
    service: Arc<dyn AuthService>,
}

impl AuthGrpcService {
    /// Create a new gRPC service wrapper.
    pub fn new(service: Arc<dyn AuthService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl AuthServiceProto for AuthGrpcService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<IdentityResponse>, Status> {
        let req = request.into_inner();

        let identity = self
            .service
            .register(req.username, req.email, req.password)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(IdentityResponse {
            id: identity.id.to_string(),
            username: identity.username,
            email: identity.email,
            created_at: identity.created_at.to_rfc3339(),
        }))
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let token = self
            .service
            .login(req.username, req.password)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(LoginResponse {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
        }))
    }

    async fn authenticate(
        &self,
        request: Request<AuthenticateRequest>,
    ) -> Result<Response<AuthenticateResponse>, Status> {
        let req = request.into_inner();

        let identity_id = self
            .service
            .authenticate(&req.token)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(AuthenticateResponse {
            identity_id: identity_id.to_string(),
        }))
    }

    async fn logout(
        &self,
        request: Request<LogoutRequest>,
    ) -> Result<Response<LogoutResponse>, Status> {
        let req = request.into_inner();

        self.service
            .logout(&req.token)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(LogoutResponse {}))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<ChangePasswordResponse>, Status> {
        let req = request.into_inner();

        // The caller proves who they are with the token, not with an id
        let identity_id = self
            .service
            .authenticate(&req.token)
            .await
            .map_err(Status::from)?;

        self.service
            .change_password(identity_id, req.old_password, req.new_password)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(ChangePasswordResponse {}))
    }
}
