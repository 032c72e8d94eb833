//! Database row and parameter types — these map directly to SQLite rows.
//! Distinct from the bloom-types API models to keep the store layer
//! independent of the wire format.

use chrono::{DateTime, NaiveDate, Utc};

use bloom_types::domain::{DeliveryMode, DropType, FlowerStatus};

pub struct UserRow {
    pub id: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct RefreshSessionRow {
    pub id: i64,
    pub user_id: i64,
    pub token_jti: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct FlowerRow {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub flower_type: String,
    pub status: FlowerStatus,
    pub stage: i64,
    pub water_count: i64,
    pub streak_count: i64,
    pub last_watered_on: Option<NaiveDate>,
    pub ready_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DropRow {
    pub id: i64,
    pub flower_id: i64,
    pub day_number: i64,
    pub drop_type: String,
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub mime_type: Option<String>,
    pub duration_seconds: Option<i64>,
    pub prompt_key: Option<String>,
    pub mood_tags: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Operation parameters --

pub struct NewSession {
    pub jti: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct NewDrop {
    pub drop_type: DropType,
    pub message: String,
    pub media_url: Option<String>,
    pub mime_type: Option<String>,
    pub duration_seconds: Option<i64>,
    pub prompt_key: Option<String>,
    pub mood_tags: Option<String>,
}

pub struct NewDelivery {
    pub share_token: String,
    pub recipient_name: Option<String>,
    pub recipient_contact: Option<String>,
    pub mode: DeliveryMode,
    pub scheduled_for: Option<DateTime<Utc>>,
}

// -- Operation results --

#[derive(Debug)]
pub struct WateredFlower {
    pub flower: FlowerRow,
    pub drop_id: i64,
    pub day_number: i64,
}

#[derive(Debug)]
pub struct SentFlower {
    pub flower_id: i64,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Everything the public open endpoint reveals, resolved in one transaction.
#[derive(Debug)]
pub struct OpenedGift {
    pub flower_id: i64,
    pub title: String,
    pub flower_type: String,
    pub sender_name: String,
    pub opened_at: Option<DateTime<Utc>>,
    pub drops: Vec<DropRow>,
}
