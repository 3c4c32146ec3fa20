use crate::config::AuthSettings;
use crate::models::ErrorResponse;
use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while authorizing an admin request
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Role {0:?} may not administer matching")]
    Forbidden(Option<String>),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: "unauthorized".to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
            current_weights: None,
        })
    }
}

/// Claims issued by the WordPress side for admin sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// An authenticated administrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    /// Display name if the token carries one, subject otherwise
    pub author: String,
}

/// Check the `Authorization: Bearer` header of `req`
pub fn authorize(req: &HttpRequest, settings: &AuthSettings) -> Result<AdminIdentity, AuthError> {
    let token = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    verify_token(token, settings)
}

pub fn verify_token(token: &str, settings: &AuthSettings) -> Result<AdminIdentity, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    let claims = data.claims;

    if claims.role.as_deref() != Some(settings.admin_role.as_str()) {
        tracing::warn!("Rejected admin request from {} ({:?})", claims.sub, claims.role);
        return Err(AuthError::Forbidden(claims.role));
    }

    Ok(AdminIdentity {
        author: claims
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(claims.sub),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            admin_role: "administrator".to_string(),
        }
    }

    fn token(role: &str, name: Option<&str>, secret: &str) -> String {
        let claims = Claims {
            sub: "42".to_string(),
            name: name.map(str::to_string),
            role: Some(role.to_string()),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_administrator_name_becomes_author() {
        let identity =
            verify_token(&token("administrator", Some("ops"), "test-secret"), &settings()).unwrap();
        assert_eq!(identity.author, "ops");

        let admin = token("administrator", None, "test-secret");
        let identity = verify_token(&admin, &settings()).unwrap();
        assert_eq!(identity.author, "42");
    }

    #[test]
    fn test_other_roles_are_forbidden() {
        let result = verify_token(&token("subscriber", None, "test-secret"), &settings());
        assert!(matches!(result, Err(AuthError::Forbidden(Some(ref r))) if r == "subscriber"));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let result = verify_token(&token("administrator", None, "other"), &settings());
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_missing_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(authorize(&req, &settings()), Err(AuthError::MissingToken)));

        let req = TestRequest::default()
            .insert_header((
                "Authorization",
                format!("Bearer {}", token("administrator", None, "test-secret")),
            ))
            .to_http_request();
        assert!(authorize(&req, &settings()).is_ok());
    }
}
