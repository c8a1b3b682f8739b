//! OpenAPI documentation.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::clients::TokenResponse;
use crate::handlers::auth_handler::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, WhoAmIResponse,
};
use domain::IdentityResponse;

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth_handler::register,
        crate::handlers::auth_handler::login,
        crate::handlers::auth_handler::logout,
        crate::handlers::auth_handler::whoami,
        crate::handlers::auth_handler::change_password,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            ChangePasswordRequest,
            TokenResponse,
            WhoAmIResponse,
            IdentityResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Credential and session endpoints"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in ["/register", "/login", "/logout", "/whoami", "/password"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
