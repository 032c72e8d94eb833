use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DeliveryMode, FlowerStatus};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestOtpRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RequestOtpResponse {
    pub status: String,
    pub message: String,
    /// Plaintext code, returned outside production only to unblock testing.
    pub debug_otp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBundleResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub email: Option<String>,
    pub handle: Option<String>,
}

// -- Flowers --

fn default_flower_type() -> String {
    "rose".to_string()
}

fn default_drop_type() -> String {
    "text".to_string()
}

fn default_delivery_mode() -> String {
    "instant".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFlowerRequest {
    pub title: String,
    #[serde(default = "default_flower_type")]
    pub flower_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlowerResponse {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub flower_type: String,
    pub status: FlowerStatus,
    pub stage: i64,
    pub water_count: i64,
    pub streak_count: i64,
    pub ready_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaterFlowerRequest {
    pub message: String,
    #[serde(default = "default_drop_type")]
    pub drop_type: String,
    pub media_url: Option<String>,
    pub mime_type: Option<String>,
    pub duration_seconds: Option<i64>,
    pub prompt_key: Option<String>,
    pub mood_tags: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaterFlowerResponse {
    pub flower: FlowerResponse,
    pub drop_id: i64,
    pub day_number: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFlowerRequest {
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
    #[serde(default = "default_delivery_mode")]
    pub delivery_mode: String,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendFlowerResponse {
    pub flower_id: i64,
    pub share_token: String,
    pub delivery_mode: DeliveryMode,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

// -- Public gift opening --

#[derive(Debug, Serialize, Deserialize)]
pub struct DropRevealResponse {
    pub id: i64,
    pub day_number: i64,
    pub drop_type: String,
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenFlowerResponse {
    pub flower_id: i64,
    pub title: String,
    pub flower_type: String,
    pub sender_name: String,
    pub opened_at: Option<DateTime<Utc>>,
    pub drops: Vec<DropRevealResponse>,
}
