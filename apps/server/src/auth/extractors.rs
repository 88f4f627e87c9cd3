use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::token::tokens_match;
use crate::config::SecurityConfig;
use crate::error::AppError;

/// Extractor for Bearer token authentication (merge API)
///
/// Usage in handlers:
/// ```ignore
/// async fn my_handler(_auth: BearerAuth) -> HttpResponse {
///     // only reached with a valid MERGE_API_TOKEN
/// }
/// ```
pub struct BearerAuth;

impl BearerAuth {
    fn authenticate(req: &HttpRequest) -> Result<Self, AppError> {
        let security = req
            .app_data::<web::Data<SecurityConfig>>()
            .ok_or_else(|| AppError::Internal("Security config not configured".to_string()))?;

        let expected = security
            .api_token
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("Merge API is disabled".to_string()))?;

        let header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized(
                "Invalid Authorization header format, expected 'Bearer <token>'".to_string(),
            )
        })?;

        if !tokens_match(token.trim(), expected) {
            return Err(AppError::Unauthorized("Invalid Bearer token".to_string()));
        }

        Ok(BearerAuth)
    }
}

impl FromRequest for BearerAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::authenticate(req))
    }
}
