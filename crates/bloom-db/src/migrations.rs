use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            handle          TEXT UNIQUE,
            display_name    TEXT,
            email           TEXT UNIQUE,
            password_hash   TEXT,
            created_at      TEXT NOT NULL
        );

        -- Keyed purely by email, no FK: codes survive user creation/deletion.
        CREATE TABLE IF NOT EXISTS auth_otp_codes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT NOT NULL,
            otp_hash    TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            consumed_at TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_otp_codes_email_created
            ON auth_otp_codes(email, created_at);

        CREATE TABLE IF NOT EXISTS auth_refresh_tokens (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_jti   TEXT NOT NULL UNIQUE,
            user_agent  TEXT,
            ip_address  TEXT,
            is_revoked  INTEGER NOT NULL DEFAULT 0,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            revoked_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user
            ON auth_refresh_tokens(user_id);

        CREATE TABLE IF NOT EXISTS flowers (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title           TEXT NOT NULL,
            flower_type     TEXT NOT NULL DEFAULT 'rose',
            status          TEXT NOT NULL DEFAULT 'growing',
            stage           INTEGER NOT NULL DEFAULT 0,
            water_count     INTEGER NOT NULL DEFAULT 0,
            streak_count    INTEGER NOT NULL DEFAULT 0,
            last_watered_on TEXT,
            ready_at        TEXT,
            sent_at         TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_flowers_owner_status
            ON flowers(owner_id, status);

        CREATE TABLE IF NOT EXISTS flower_drops (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            flower_id        INTEGER NOT NULL REFERENCES flowers(id) ON DELETE CASCADE,
            day_number       INTEGER NOT NULL,
            drop_type        TEXT NOT NULL,
            message          TEXT,
            media_url        TEXT,
            mime_type        TEXT,
            duration_seconds INTEGER,
            prompt_key       TEXT,
            mood_tags        TEXT,
            created_at       TEXT NOT NULL,
            UNIQUE(flower_id, day_number)
        );

        CREATE INDEX IF NOT EXISTS idx_flower_drops_flower_created
            ON flower_drops(flower_id, created_at);

        CREATE TABLE IF NOT EXISTS flower_deliveries (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            flower_id         INTEGER NOT NULL UNIQUE REFERENCES flowers(id) ON DELETE CASCADE,
            share_token       TEXT NOT NULL UNIQUE,
            recipient_name    TEXT,
            recipient_contact TEXT,
            delivery_mode     TEXT NOT NULL DEFAULT 'instant',
            scheduled_for     TEXT,
            sent_at           TEXT,
            opened_at         TEXT,
            expires_at        TEXT,
            revoked_at        TEXT,
            created_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_flower_deliveries_scheduled
            ON flower_deliveries(scheduled_for);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
