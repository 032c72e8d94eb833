use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;

use bloom_db::models::{DropRow, FlowerRow, NewDelivery, NewDrop};
use bloom_types::api::{
    CreateFlowerRequest, DropRevealResponse, FlowerResponse, OpenFlowerResponse,
    SendFlowerRequest, SendFlowerResponse, WaterFlowerRequest, WaterFlowerResponse,
};
use bloom_types::domain::{DeliveryMode, DropType};

use crate::error::{ApiError, join_error};
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub async fn create_flower(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateFlowerRequest>,
) -> Result<(StatusCode, Json<FlowerResponse>), ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() || title.len() > 80 {
        return Err(ApiError::BadRequest(
            "title must be between 1 and 80 characters".to_string(),
        ));
    }
    let flower_type = payload.flower_type.trim().to_lowercase();
    if flower_type.is_empty() || flower_type.len() > 32 {
        return Err(ApiError::BadRequest(
            "flower_type must be between 1 and 32 characters".to_string(),
        ));
    }

    let now = Utc::now();
    let db = state.clone();
    let flower = tokio::task::spawn_blocking(move || {
        db.db.create_flower(user.id, &title, &flower_type, now)
    })
    .await
    .map_err(join_error)??;

    Ok((StatusCode::CREATED, Json(flower_response(flower))))
}

pub async fn list_flowers(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<FlowerResponse>>, ApiError> {
    let db = state.clone();
    let flowers = tokio::task::spawn_blocking(move || db.db.list_flowers(user.id))
        .await
        .map_err(join_error)??;

    Ok(Json(flowers.into_iter().map(flower_response).collect()))
}

pub async fn water_flower(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(flower_id): Path<i64>,
    Json(payload): Json<WaterFlowerRequest>,
) -> Result<Json<WaterFlowerResponse>, ApiError> {
    let drop = validate_drop(&payload)?;

    let now = Utc::now();
    let today = now.date_naive();
    let db = state.clone();
    let watered = tokio::task::spawn_blocking(move || {
        db.db.water_flower(user.id, flower_id, &drop, today, now)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(WaterFlowerResponse {
        flower: flower_response(watered.flower),
        drop_id: watered.drop_id,
        day_number: watered.day_number,
    }))
}

pub async fn send_flower(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(flower_id): Path<i64>,
    Json(payload): Json<SendFlowerRequest>,
) -> Result<Json<SendFlowerResponse>, ApiError> {
    let mode = DeliveryMode::parse(&payload.delivery_mode)
        .ok_or_else(|| ApiError::BadRequest("Invalid delivery mode".to_string()))?;

    let now = Utc::now();
    let scheduled_for = match mode {
        DeliveryMode::Instant => None,
        DeliveryMode::Scheduled => {
            let when = payload.scheduled_for.ok_or_else(|| {
                ApiError::BadRequest("scheduled_for is required for scheduled delivery".to_string())
            })?;
            if when <= now {
                return Err(ApiError::BadRequest(
                    "scheduled_for must be in the future".to_string(),
                ));
            }
            Some(when)
        }
    };

    let recipient_name = optional_bounded(payload.recipient_name, 80, "recipient_name")?;
    let recipient_contact = optional_bounded(payload.recipient_contact, 255, "recipient_contact")?;

    let share_token = generate_share_token();
    let delivery = NewDelivery {
        share_token: share_token.clone(),
        recipient_name,
        recipient_contact,
        mode,
        scheduled_for,
    };

    let db = state.clone();
    let sent = tokio::task::spawn_blocking(move || {
        db.db.send_flower(user.id, flower_id, &delivery, now)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(SendFlowerResponse {
        flower_id: sent.flower_id,
        share_token,
        delivery_mode: mode,
        scheduled_for,
        sent_at: sent.sent_at,
    }))
}

/// GET /flowers/open/{share_token}. Public: possession of the token is the
/// only credential.
pub async fn open_flower(
    State(state): State<AppState>,
    Path(share_token): Path<String>,
) -> Result<Json<OpenFlowerResponse>, ApiError> {
    let now = Utc::now();
    let db = state.clone();
    let gift = tokio::task::spawn_blocking(move || db.db.open_delivery(&share_token, now))
        .await
        .map_err(join_error)??;

    Ok(Json(OpenFlowerResponse {
        flower_id: gift.flower_id,
        title: gift.title,
        flower_type: gift.flower_type,
        sender_name: gift.sender_name,
        opened_at: gift.opened_at,
        drops: gift.drops.into_iter().map(drop_reveal).collect(),
    }))
}

fn validate_drop(payload: &WaterFlowerRequest) -> Result<NewDrop, ApiError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() || message.len() > 2000 {
        return Err(ApiError::BadRequest(
            "message must be between 1 and 2000 characters".to_string(),
        ));
    }
    let drop_type = DropType::parse(&payload.drop_type)
        .ok_or_else(|| ApiError::BadRequest("Invalid drop type".to_string()))?;

    if let Some(url) = &payload.media_url {
        if url.len() > 2000 {
            return Err(ApiError::BadRequest("media_url is too long".to_string()));
        }
    }
    if let Some(mime) = &payload.mime_type {
        if mime.len() > 100 {
            return Err(ApiError::BadRequest("mime_type is too long".to_string()));
        }
    }
    if let Some(duration) = payload.duration_seconds {
        if !(1..=3600).contains(&duration) {
            return Err(ApiError::BadRequest(
                "duration_seconds must be between 1 and 3600".to_string(),
            ));
        }
    }
    if let Some(key) = &payload.prompt_key {
        if key.len() > 64 {
            return Err(ApiError::BadRequest("prompt_key is too long".to_string()));
        }
    }
    if let Some(tags) = &payload.mood_tags {
        if tags.len() > 120 {
            return Err(ApiError::BadRequest("mood_tags is too long".to_string()));
        }
    }

    Ok(NewDrop {
        drop_type,
        message,
        media_url: payload.media_url.clone(),
        mime_type: payload.mime_type.clone(),
        duration_seconds: payload.duration_seconds,
        prompt_key: payload.prompt_key.clone(),
        mood_tags: payload.mood_tags.clone(),
    })
}

fn optional_bounded(
    value: Option<String>,
    max: usize,
    field: &str,
) -> Result<Option<String>, ApiError> {
    match value {
        Some(raw) => {
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                return Ok(None);
            }
            if trimmed.len() > max {
                return Err(ApiError::BadRequest(format!("{field} is too long")));
            }
            Ok(Some(trimmed))
        }
        None => Ok(None),
    }
}

/// Unguessable share token: 32 random bytes, base64url without padding.
fn generate_share_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn flower_response(flower: FlowerRow) -> FlowerResponse {
    FlowerResponse {
        id: flower.id,
        owner_id: flower.owner_id,
        title: flower.title,
        flower_type: flower.flower_type,
        status: flower.status,
        stage: flower.stage,
        water_count: flower.water_count,
        streak_count: flower.streak_count,
        ready_at: flower.ready_at,
        sent_at: flower.sent_at,
        created_at: flower.created_at,
    }
}

fn drop_reveal(drop: DropRow) -> DropRevealResponse {
    DropRevealResponse {
        id: drop.id,
        day_number: drop.day_number,
        drop_type: drop.drop_type,
        message: drop.message,
        media_url: drop.media_url,
        created_at: drop.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_tokens_are_url_safe_and_distinct() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
