use axum_core::extract::FromRequestParts;
use http::{StatusCode, request::Parts};

use crate::Session;

/// Axum Extractor for [`Session`].
///
/// Rejects with `500 Internal Server Error` when the route is not wrapped in a
/// [`SessionLayer`](crate::SessionLayer).
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Session::from_extensions(&parts.extensions).map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "session layer not found in the request extensions",
            )
        })
    }
}
