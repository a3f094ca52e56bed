//! Admin token check for the worker endpoints.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Require the `token` header to match the configured `ADMIN_TOKEN`.
///
/// Both sides are optional on purpose: an instance with no token configured
/// accepts requests with no token header. That is how development and
/// trusted-network deployments run; anything public sets the token.
pub async fn require_admin_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request.headers().get("token").and_then(|value| value.to_str().ok());
    if presented != state.admin_token.as_deref() {
        return ApiError::bad_request("Invalid token").into_response();
    }
    next.run(request).await
}
