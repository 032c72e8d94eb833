use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use bloom_auth::tokens::{self, TokenKind};

use crate::error::{ApiError, join_error};
use crate::state::AppState;

/// Authenticated principal, resolved once per request and attached as a
/// request extension for handlers to read.
#[derive(Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub email: Option<String>,
    pub handle: Option<String>,
    pub display_name: Option<String>,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?
        .to_string();

    let claims = tokens::verify(&state.config.jwt_secret, &token, TokenKind::Access)
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || db.db.get_user(user_id))
        .await
        .map_err(join_error)??
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        handle: user.handle,
        display_name: user.display_name,
    });

    Ok(next.run(req).await)
}
