use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use bloom_auth::otp;
use bloom_auth::tokens::{self, TokenKind};
use bloom_db::models::NewSession;
use bloom_types::api::{
    LogoutRequest, RefreshRequest, RequestOtpRequest, RequestOtpResponse, TokenBundleResponse,
    VerifyOtpRequest,
};

use crate::error::{ApiError, join_error};
use crate::state::AppState;

const MAX_EMAIL_LEN: usize = 255;

/// POST /auth/request-otp. Always answers 202 on success so the response
/// does not reveal whether an account exists. Outside production the code is
/// echoed back for local clients and tests.
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<(StatusCode, Json<RequestOtpResponse>), ApiError> {
    let email = otp::normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') || email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }

    let code = otp::generate_code(state.config.otp_length);
    let otp_hash = otp::hash_code(&state.config.otp_secret, &email, &code);
    let now = Utc::now();
    let expires_at = now + Duration::minutes(state.config.otp_ttl_minutes);

    let db = state.clone();
    let stored_email = email.clone();
    tokio::task::spawn_blocking(move || {
        db.db
            .insert_otp_code(&stored_email, &otp_hash, expires_at, now)
    })
    .await
    .map_err(join_error)??;

    match &state.mailer {
        Some(mailer) => {
            mailer
                .send_otp(&email, &code, state.config.otp_ttl_minutes)
                .await
                .map_err(|err| {
                    warn!(email = %email, "OTP email delivery failed: {err}");
                    ApiError::BadGateway("Could not send OTP email. Please try again.".to_string())
                })?;
        }
        None if state.config.is_production() => {
            return Err(ApiError::ServiceUnavailable(
                "Email delivery is not configured.".to_string(),
            ));
        }
        None => {
            debug!(email = %email, "no mailer configured, returning OTP inline");
        }
    }

    let debug_otp = (!state.config.is_production()).then_some(code);
    Ok((
        StatusCode::ACCEPTED,
        Json(RequestOtpResponse {
            status: "accepted".to_string(),
            message: "If the email exists, an OTP will be sent.".to_string(),
            debug_otp,
        }),
    ))
}

/// POST /auth/verify-otp. Consuming the code and upserting the user commit
/// together; the refresh session is persisted afterwards, so a signed token
/// whose session insert failed is simply never honored.
pub async fn verify_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<TokenBundleResponse>, ApiError> {
    let email = otp::normalize_email(&payload.email);
    let otp_hash = otp::hash_code(&state.config.otp_secret, &email, payload.otp.trim());
    let now = Utc::now();

    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || db.db.redeem_otp(&email, &otp_hash, now))
        .await
        .map_err(join_error)??
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired OTP".to_string()))?;

    let bundle = issue_token_bundle(&state, user.id, &headers, now).await?;
    Ok(Json(bundle))
}

/// POST /auth/refresh. Single-use rotation: the presented token's session is
/// revoked and replaced in one transaction, so replaying it afterwards fails.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenBundleResponse>, ApiError> {
    let claims = tokens::verify(
        &state.config.jwt_secret,
        &payload.refresh_token,
        TokenKind::Refresh,
    )
    .map_err(|_| ApiError::Unauthorized("Refresh token is invalid".to_string()))?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthorized("Refresh token is invalid".to_string()))?;

    let now = Utc::now();
    let access = tokens::issue(
        &state.config.jwt_secret,
        user_id,
        TokenKind::Access,
        Duration::minutes(state.config.access_token_ttl_minutes),
    )
    .map_err(|err| ApiError::Internal(err.into()))?;
    let refresh = tokens::issue(
        &state.config.jwt_secret,
        user_id,
        TokenKind::Refresh,
        Duration::days(state.config.refresh_token_ttl_days),
    )
    .map_err(|err| ApiError::Internal(err.into()))?;

    let (user_agent, ip_address) = client_meta(&headers);
    let session = NewSession {
        jti: refresh.jti.clone(),
        user_agent,
        ip_address,
        expires_at: refresh.expires_at,
    };

    let db = state.clone();
    let jti = claims.jti.clone();
    let rotated_user =
        tokio::task::spawn_blocking(move || db.db.rotate_refresh_session(&jti, &session, now))
            .await
            .map_err(join_error)??
            .ok_or_else(|| ApiError::Unauthorized("Refresh token is invalid".to_string()))?;

    if rotated_user != user_id {
        return Err(ApiError::Unauthorized(
            "Refresh token is invalid".to_string(),
        ));
    }

    Ok(Json(TokenBundleResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "bearer".to_string(),
        expires_in: state.config.access_token_ttl_minutes * 60,
    }))
}

/// POST /auth/logout. Best effort: an undecodable token still gets 204, the
/// client is logged out either way.
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Result<StatusCode, ApiError> {
    let Ok(claims) = tokens::verify(
        &state.config.jwt_secret,
        &payload.refresh_token,
        TokenKind::Refresh,
    ) else {
        return Ok(StatusCode::NO_CONTENT);
    };

    let now = Utc::now();
    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.revoke_refresh_session(&claims.jti, now))
        .await
        .map_err(join_error)??;

    Ok(StatusCode::NO_CONTENT)
}

async fn issue_token_bundle(
    state: &AppState,
    user_id: i64,
    headers: &HeaderMap,
    now: chrono::DateTime<Utc>,
) -> Result<TokenBundleResponse, ApiError> {
    let access = tokens::issue(
        &state.config.jwt_secret,
        user_id,
        TokenKind::Access,
        Duration::minutes(state.config.access_token_ttl_minutes),
    )
    .map_err(|err| ApiError::Internal(err.into()))?;
    let refresh = tokens::issue(
        &state.config.jwt_secret,
        user_id,
        TokenKind::Refresh,
        Duration::days(state.config.refresh_token_ttl_days),
    )
    .map_err(|err| ApiError::Internal(err.into()))?;

    let (user_agent, ip_address) = client_meta(headers);
    let session = NewSession {
        jti: refresh.jti.clone(),
        user_agent,
        ip_address,
        expires_at: refresh.expires_at,
    };

    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.create_refresh_session(user_id, &session, now))
        .await
        .map_err(join_error)??;

    Ok(TokenBundleResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "bearer".to_string(),
        expires_in: state.config.access_token_ttl_minutes * 60,
    })
}

fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    (user_agent, ip_address)
}
