use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use bloom_types::domain::{DeliveryMode, FlowerStatus, READY_WATER_COUNT, stage_for_water_count};

use crate::models::{
    DropRow, FlowerRow, NewDelivery, NewDrop, NewSession, OpenedGift, RefreshSessionRow,
    SentFlower, UserRow, WateredFlower,
};
use crate::{Database, StoreError};

const FLOWER_COLUMNS: &str = "id, owner_id, title, flower_type, status, stage, water_count, \
     streak_count, last_watered_on, ready_at, sent_at, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| Ok(query_user_by_id(conn, id)?))
    }

    // -- OTP codes --

    /// Every request inserts a fresh row; prior unexpired codes stay valid.
    pub fn insert_otp_code(
        &self,
        email: &str,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_otp_codes (email, otp_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![email, otp_hash, expires_at, now],
            )?;
            Ok(())
        })
    }

    /// Consume the newest matching unconsumed, unexpired code and upsert the
    /// user keyed by email, all in one transaction. Returns the user, or None
    /// when no valid code matched (nothing is mutated in that case).
    pub fn redeem_otp(
        &self,
        email: &str,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let candidates: Vec<(i64, DateTime<Utc>)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, expires_at FROM auth_otp_codes
                     WHERE email = ?1 AND otp_hash = ?2 AND consumed_at IS NULL
                     ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(params![email, otp_hash], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let Some((otp_id, _)) = candidates.into_iter().find(|(_, exp)| *exp > now) else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE auth_otp_codes SET consumed_at = ?1 WHERE id = ?2",
                params![now, otp_id],
            )?;

            let user = match query_user_by_email(&tx, email)? {
                Some(user) => user,
                None => {
                    tx.execute(
                        "INSERT INTO users (email, created_at) VALUES (?1, ?2)",
                        params![email, now],
                    )?;
                    let id = tx.last_insert_rowid();
                    query_user_by_id(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?
                }
            };

            tx.commit()?;
            Ok(Some(user))
        })
    }

    // -- Refresh sessions --

    pub fn create_refresh_session(
        &self,
        user_id: i64,
        session: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            insert_refresh_session(conn, user_id, session, now)?;
            Ok(())
        })
    }

    /// Strict rotation: revoke the presented session and persist its
    /// replacement in one transaction. Returns the owning user id, or None
    /// when the jti is unknown, already revoked, or expired — the row is left
    /// untouched in those cases.
    pub fn rotate_refresh_session(
        &self,
        jti: &str,
        new_session: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<(i64, i64, bool, DateTime<Utc>)> = tx
                .query_row(
                    "SELECT id, user_id, is_revoked, expires_at
                     FROM auth_refresh_tokens WHERE token_jti = ?1",
                    [jti],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            let Some((id, user_id, is_revoked, expires_at)) = row else {
                return Ok(None);
            };
            if is_revoked || expires_at <= now {
                return Ok(None);
            }

            tx.execute(
                "UPDATE auth_refresh_tokens SET is_revoked = 1, revoked_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            insert_refresh_session(&tx, user_id, new_session, now)?;

            tx.commit()?;
            Ok(Some(user_id))
        })
    }

    /// Best-effort revocation; revoking an unknown or already-revoked session
    /// is a no-op.
    pub fn revoke_refresh_session(&self, jti: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE auth_refresh_tokens SET is_revoked = 1, revoked_at = ?1
                 WHERE token_jti = ?2 AND is_revoked = 0",
                params![now, jti],
            )?;
            Ok(())
        })
    }

    pub fn get_refresh_session(&self, jti: &str) -> Result<Option<RefreshSessionRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, token_jti, user_agent, ip_address, is_revoked,
                            expires_at, created_at, revoked_at
                     FROM auth_refresh_tokens WHERE token_jti = ?1",
                    [jti],
                    |row| {
                        Ok(RefreshSessionRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            token_jti: row.get(2)?,
                            user_agent: row.get(3)?,
                            ip_address: row.get(4)?,
                            is_revoked: row.get(5)?,
                            expires_at: row.get(6)?,
                            created_at: row.get(7)?,
                            revoked_at: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Flowers --

    pub fn create_flower(
        &self,
        owner_id: i64,
        title: &str,
        flower_type: &str,
        now: DateTime<Utc>,
    ) -> Result<FlowerRow, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO flowers (owner_id, title, flower_type, status, stage,
                                      water_count, streak_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'growing', 0, 0, 0, ?4, ?4)",
                params![owner_id, title, flower_type, now],
            )?;
            let id = conn.last_insert_rowid();
            Ok(query_flower_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?)
        })
    }

    pub fn list_flowers(&self, owner_id: i64) -> Result<Vec<FlowerRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLOWER_COLUMNS} FROM flowers WHERE owner_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id], flower_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_flower(&self, id: i64) -> Result<Option<FlowerRow>, StoreError> {
        self.with_conn(|conn| Ok(query_flower_by_id(conn, id)?))
    }

    /// One watering per UTC calendar day. Appends the drop, updates the
    /// streak and stage, and performs the growing -> ready transition on the
    /// first crossing of the ready threshold — all committed together.
    pub fn water_flower(
        &self,
        owner_id: i64,
        flower_id: i64,
        drop: &NewDrop,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WateredFlower, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut flower =
                query_owned_flower(&tx, owner_id, flower_id)?.ok_or(StoreError::FlowerNotFound)?;

            if flower.status == FlowerStatus::Sent {
                return Err(StoreError::FlowerAlreadySent);
            }
            // Sending locks out watering even while a scheduled delivery is
            // pending and the status is still `ready`.
            if delivery_exists(&tx, flower_id)? {
                return Err(StoreError::DeliveryExists);
            }
            if flower.last_watered_on == Some(today) {
                return Err(StoreError::AlreadyWateredToday);
            }

            let day_number = flower.water_count + 1;
            tx.execute(
                "INSERT INTO flower_drops (flower_id, day_number, drop_type, message, media_url,
                                           mime_type, duration_seconds, prompt_key, mood_tags,
                                           created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    flower_id,
                    day_number,
                    drop.drop_type.as_str(),
                    drop.message,
                    drop.media_url,
                    drop.mime_type,
                    drop.duration_seconds,
                    drop.prompt_key,
                    drop.mood_tags,
                    now,
                ],
            )?;
            let drop_id = tx.last_insert_rowid();

            let watered_yesterday = flower
                .last_watered_on
                .is_some_and(|last| (today - last).num_days() == 1);
            flower.streak_count = if watered_yesterday {
                flower.streak_count + 1
            } else {
                1
            };
            flower.last_watered_on = Some(today);
            flower.water_count = day_number;
            flower.stage = stage_for_water_count(day_number);
            flower.updated_at = now;

            if day_number >= READY_WATER_COUNT && flower.status == FlowerStatus::Growing {
                flower.status = FlowerStatus::Ready;
                if flower.ready_at.is_none() {
                    flower.ready_at = Some(now);
                }
            }

            tx.execute(
                "UPDATE flowers SET status = ?1, stage = ?2, water_count = ?3, streak_count = ?4,
                        last_watered_on = ?5, ready_at = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    flower.status.as_str(),
                    flower.stage,
                    flower.water_count,
                    flower.streak_count,
                    flower.last_watered_on,
                    flower.ready_at,
                    flower.updated_at,
                    flower_id,
                ],
            )?;

            tx.commit()?;
            Ok(WateredFlower {
                flower,
                drop_id,
                day_number,
            })
        })
    }

    /// Create the single delivery for a ready flower. Instant mode stamps
    /// sent_at and moves the flower to `sent` immediately; scheduled mode
    /// leaves both until the first on-time open.
    pub fn send_flower(
        &self,
        owner_id: i64,
        flower_id: i64,
        delivery: &NewDelivery,
        now: DateTime<Utc>,
    ) -> Result<SentFlower, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let flower =
                query_owned_flower(&tx, owner_id, flower_id)?.ok_or(StoreError::FlowerNotFound)?;

            if delivery_exists(&tx, flower_id)? {
                return Err(StoreError::DeliveryExists);
            }
            if flower.status != FlowerStatus::Ready {
                return Err(StoreError::FlowerNotReady);
            }

            let sent_at = match delivery.mode {
                DeliveryMode::Instant => Some(now),
                DeliveryMode::Scheduled => None,
            };

            tx.execute(
                "INSERT INTO flower_deliveries (flower_id, share_token, recipient_name,
                                                recipient_contact, delivery_mode, scheduled_for,
                                                sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    flower_id,
                    delivery.share_token,
                    delivery.recipient_name,
                    delivery.recipient_contact,
                    delivery.mode.as_str(),
                    delivery.scheduled_for,
                    sent_at,
                    now,
                ],
            )?;

            if delivery.mode == DeliveryMode::Instant {
                tx.execute(
                    "UPDATE flowers SET status = 'sent', sent_at = ?1, updated_at = ?1
                     WHERE id = ?2",
                    params![now, flower_id],
                )?;
            }

            tx.commit()?;
            Ok(SentFlower { flower_id, sent_at })
        })
    }

    /// Public open path. Performs the lazy scheduled -> sent transition and
    /// stamps opened_at on first open; both are idempotent afterwards.
    pub fn open_delivery(
        &self,
        share_token: &str,
        now: DateTime<Utc>,
    ) -> Result<OpenedGift, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<DeliveryView> = tx
                .query_row(
                    "SELECT d.id, d.flower_id, d.scheduled_for, d.sent_at, d.opened_at,
                            d.expires_at, d.revoked_at, f.title, f.flower_type,
                            u.display_name, u.handle, u.email
                     FROM flower_deliveries d
                     JOIN flowers f ON f.id = d.flower_id
                     JOIN users u ON u.id = f.owner_id
                     WHERE d.share_token = ?1",
                    [share_token],
                    |row| {
                        Ok(DeliveryView {
                            id: row.get(0)?,
                            flower_id: row.get(1)?,
                            scheduled_for: row.get(2)?,
                            sent_at: row.get(3)?,
                            opened_at: row.get(4)?,
                            expires_at: row.get(5)?,
                            revoked_at: row.get(6)?,
                            title: row.get(7)?,
                            flower_type: row.get(8)?,
                            sender_display_name: row.get(9)?,
                            sender_handle: row.get(10)?,
                            sender_email: row.get(11)?,
                        })
                    },
                )
                .optional()?;
            let mut view = row.ok_or(StoreError::GiftNotFound)?;

            if view.revoked_at.is_some() {
                return Err(StoreError::GiftRevoked);
            }
            if view.expires_at.is_some_and(|exp| exp <= now) {
                return Err(StoreError::GiftExpired);
            }
            if view.sent_at.is_none() && view.scheduled_for.is_some_and(|at| at > now) {
                return Err(StoreError::GiftNotYetAvailable);
            }

            // The only path by which a scheduled delivery's sent_at and its
            // flower's status actually advance; there is no background job.
            if view.sent_at.is_none() && view.scheduled_for.is_some_and(|at| at <= now) {
                tx.execute(
                    "UPDATE flower_deliveries SET sent_at = ?1 WHERE id = ?2",
                    params![now, view.id],
                )?;
                tx.execute(
                    "UPDATE flowers SET status = 'sent', sent_at = ?1, updated_at = ?1
                     WHERE id = ?2",
                    params![now, view.flower_id],
                )?;
                view.sent_at = Some(now);
            }

            if view.opened_at.is_none() {
                tx.execute(
                    "UPDATE flower_deliveries SET opened_at = ?1 WHERE id = ?2",
                    params![now, view.id],
                )?;
                view.opened_at = Some(now);
            }

            let drops = query_drops_for_flower(&tx, view.flower_id)?;
            tx.commit()?;

            let sender_name = view
                .sender_display_name
                .or(view.sender_handle)
                .or(view.sender_email)
                .unwrap_or_else(|| "Someone".to_string());

            Ok(OpenedGift {
                flower_id: view.flower_id,
                title: view.title,
                flower_type: view.flower_type,
                sender_name,
                opened_at: view.opened_at,
                drops,
            })
        })
    }
}

struct DeliveryView {
    id: i64,
    flower_id: i64,
    scheduled_for: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    title: String,
    flower_type: String,
    sender_display_name: Option<String>,
    sender_handle: Option<String>,
    sender_email: Option<String>,
}

fn insert_refresh_session(
    conn: &Connection,
    user_id: i64,
    session: &NewSession,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO auth_refresh_tokens (user_id, token_jti, user_agent, ip_address,
                                          is_revoked, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        params![
            user_id,
            session.jti,
            session.user_agent,
            session.ip_address,
            session.expires_at,
            now,
        ],
    )?;
    Ok(())
}

fn delivery_exists(conn: &Connection, flower_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM flower_deliveries WHERE flower_id = ?1)",
        [flower_id],
        |row| row.get(0),
    )
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_user_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, handle, display_name, email, password_hash, created_at
         FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )
    .optional()
}

fn query_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, handle, display_name, email, password_hash, created_at
         FROM users WHERE email = ?1",
        [email],
        user_from_row,
    )
    .optional()
}

fn flower_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FlowerRow> {
    let status_raw: String = row.get(4)?;
    let status = FlowerStatus::parse(&status_raw).unwrap_or_else(|| {
        warn!("Unknown flower status '{}', treating as growing", status_raw);
        FlowerStatus::Growing
    });

    Ok(FlowerRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        flower_type: row.get(3)?,
        status,
        stage: row.get(5)?,
        water_count: row.get(6)?,
        streak_count: row.get(7)?,
        last_watered_on: row.get(8)?,
        ready_at: row.get(9)?,
        sent_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn query_flower_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<FlowerRow>> {
    conn.query_row(
        &format!("SELECT {FLOWER_COLUMNS} FROM flowers WHERE id = ?1"),
        [id],
        flower_from_row,
    )
    .optional()
}

fn query_owned_flower(
    conn: &Connection,
    owner_id: i64,
    flower_id: i64,
) -> rusqlite::Result<Option<FlowerRow>> {
    conn.query_row(
        &format!("SELECT {FLOWER_COLUMNS} FROM flowers WHERE id = ?1 AND owner_id = ?2"),
        params![flower_id, owner_id],
        flower_from_row,
    )
    .optional()
}

fn query_drops_for_flower(conn: &Connection, flower_id: i64) -> rusqlite::Result<Vec<DropRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, flower_id, day_number, drop_type, message, media_url, mime_type,
                duration_seconds, prompt_key, mood_tags, created_at
         FROM flower_drops WHERE flower_id = ?1
         ORDER BY day_number ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([flower_id], |row| {
            Ok(DropRow {
                id: row.get(0)?,
                flower_id: row.get(1)?,
                day_number: row.get(2)?,
                drop_type: row.get(3)?,
                message: row.get(4)?,
                media_url: row.get(5)?,
                mime_type: row.get(6)?,
                duration_seconds: row.get(7)?,
                prompt_key: row.get(8)?,
                mood_tags: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloom_types::domain::DropType;
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, email: &str) -> i64 {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, created_at) VALUES (?1, ?2)",
                params![email, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
    }

    fn text_drop(message: &str) -> NewDrop {
        NewDrop {
            drop_type: DropType::Text,
            message: message.to_string(),
            media_url: None,
            mime_type: None,
            duration_seconds: None,
            prompt_key: None,
            mood_tags: None,
        }
    }

    fn instant_delivery(token: &str) -> NewDelivery {
        NewDelivery {
            share_token: token.to_string(),
            recipient_name: None,
            recipient_contact: None,
            mode: DeliveryMode::Instant,
            scheduled_for: None,
        }
    }

    fn backdate_last_watered(db: &Database, flower_id: i64, date: NaiveDate) {
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE flowers SET last_watered_on = ?1 WHERE id = ?2",
                params![date, flower_id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    fn force_ready(db: &Database, flower_id: i64) {
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE flowers SET status = 'ready', ready_at = ?1 WHERE id = ?2",
                params![Utc::now(), flower_id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn watering_once_per_day_and_streaks() {
        let db = test_db();
        let owner = seed_user(&db, "gardener@example.com");
        let now = Utc::now();
        let today = now.date_naive();

        let flower = db.create_flower(owner, "For You", "rose", now).unwrap();
        assert_eq!(flower.status, FlowerStatus::Growing);

        let watered = db
            .water_flower(owner, flower.id, &text_drop("day one"), today, now)
            .unwrap();
        assert_eq!(watered.day_number, 1);
        assert_eq!(watered.flower.water_count, 1);
        assert_eq!(watered.flower.streak_count, 1);

        let err = db
            .water_flower(owner, flower.id, &text_drop("again"), today, now)
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyWateredToday));

        // Watered yesterday: streak continues.
        backdate_last_watered(&db, flower.id, today - Duration::days(1));
        let watered = db
            .water_flower(owner, flower.id, &text_drop("day two"), today, now)
            .unwrap();
        assert_eq!(watered.day_number, 2);
        assert_eq!(watered.flower.streak_count, 2);

        // Gap of three days: streak resets to 1.
        backdate_last_watered(&db, flower.id, today - Duration::days(3));
        let watered = db
            .water_flower(owner, flower.id, &text_drop("day three"), today, now)
            .unwrap();
        assert_eq!(watered.flower.water_count, 3);
        assert_eq!(watered.flower.streak_count, 1);
        assert_eq!(watered.flower.stage, 1);
    }

    #[test]
    fn water_count_drives_stage_and_ready_transition() {
        let db = test_db();
        let owner = seed_user(&db, "gardener@example.com");
        let now = Utc::now();
        let today = now.date_naive();

        let flower = db.create_flower(owner, "Bloom", "tulip", now).unwrap();

        let mut ready_at = None;
        for day in 1..=8 {
            let watered = db
                .water_flower(owner, flower.id, &text_drop("drop"), today, now)
                .unwrap();
            assert_eq!(watered.day_number, day);
            assert_eq!(watered.flower.stage, stage_for_water_count(day));

            if day < 7 {
                assert_eq!(watered.flower.status, FlowerStatus::Growing);
                assert!(watered.flower.ready_at.is_none());
            } else {
                assert_eq!(watered.flower.status, FlowerStatus::Ready);
                assert!(watered.flower.ready_at.is_some());
            }
            if day == 7 {
                ready_at = watered.flower.ready_at;
            }
            if day == 8 {
                // ready_at is stamped only on the first crossing.
                assert_eq!(watered.flower.ready_at, ready_at);
            }

            backdate_last_watered(&db, flower.id, today - Duration::days(1));
        }
    }

    #[test]
    fn watering_not_owned_flower_fails() {
        let db = test_db();
        let owner = seed_user(&db, "gardener@example.com");
        let other = seed_user(&db, "stranger@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "Mine", "rose", now).unwrap();
        let err = db
            .water_flower(other, flower.id, &text_drop("sneaky"), now.date_naive(), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::FlowerNotFound));
    }

    #[test]
    fn send_requires_ready_and_single_delivery() {
        let db = test_db();
        let owner = seed_user(&db, "sender@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "Our Bloom", "rose", now).unwrap();

        let err = db
            .send_flower(owner, flower.id, &instant_delivery("tok-1"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::FlowerNotReady));

        force_ready(&db, flower.id);
        let sent = db
            .send_flower(owner, flower.id, &instant_delivery("tok-1"), now)
            .unwrap();
        assert!(sent.sent_at.is_some());

        let flower_after = db.get_flower(flower.id).unwrap().unwrap();
        assert_eq!(flower_after.status, FlowerStatus::Sent);
        assert!(flower_after.sent_at.is_some());

        let err = db
            .send_flower(owner, flower.id, &instant_delivery("tok-2"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::DeliveryExists));

        let err = db
            .water_flower(owner, flower.id, &text_drop("late"), now.date_naive(), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::FlowerAlreadySent));
    }

    #[test]
    fn scheduled_delivery_blocks_watering_while_ready() {
        let db = test_db();
        let owner = seed_user(&db, "sender@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "Later", "rose", now).unwrap();
        force_ready(&db, flower.id);

        let delivery = NewDelivery {
            share_token: "tok-sched".to_string(),
            recipient_name: None,
            recipient_contact: None,
            mode: DeliveryMode::Scheduled,
            scheduled_for: Some(now + Duration::days(1)),
        };
        let sent = db.send_flower(owner, flower.id, &delivery, now).unwrap();
        assert!(sent.sent_at.is_none());

        // Status stays ready until the gift is opened on time, but the
        // pending delivery still locks out watering.
        let flower_after = db.get_flower(flower.id).unwrap().unwrap();
        assert_eq!(flower_after.status, FlowerStatus::Ready);

        let err = db
            .water_flower(owner, flower.id, &text_drop("extra"), now.date_naive(), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::DeliveryExists));
    }

    #[test]
    fn open_gates_and_lazy_sent_transition() {
        let db = test_db();
        let owner = seed_user(&db, "sender@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "Open Later", "rose", now).unwrap();
        db.water_flower(owner, flower.id, &text_drop("hi"), now.date_naive(), now)
            .unwrap();
        force_ready(&db, flower.id);

        let delivery = NewDelivery {
            share_token: "tok-open".to_string(),
            recipient_name: Some("Alex".to_string()),
            recipient_contact: None,
            mode: DeliveryMode::Scheduled,
            scheduled_for: Some(now + Duration::days(1)),
        };
        db.send_flower(owner, flower.id, &delivery, now).unwrap();

        assert!(matches!(
            db.open_delivery("unknown", now).unwrap_err(),
            StoreError::GiftNotFound
        ));
        assert!(matches!(
            db.open_delivery("tok-open", now).unwrap_err(),
            StoreError::GiftNotYetAvailable
        ));

        // Due time arrives: first open flips the flower to sent.
        let later = now + Duration::days(2);
        let gift = db.open_delivery("tok-open", later).unwrap();
        assert_eq!(gift.flower_id, flower.id);
        assert_eq!(gift.drops.len(), 1);
        assert_eq!(gift.opened_at, Some(later));

        let flower_after = db.get_flower(flower.id).unwrap().unwrap();
        assert_eq!(flower_after.status, FlowerStatus::Sent);
        assert_eq!(flower_after.sent_at, Some(later));

        // opened_at is never overwritten on later opens.
        let again = db.open_delivery("tok-open", later + Duration::hours(1)).unwrap();
        assert_eq!(again.opened_at, Some(later));
    }

    #[test]
    fn open_rejects_revoked_and_expired() {
        let db = test_db();
        let owner = seed_user(&db, "sender@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "Gone", "rose", now).unwrap();
        force_ready(&db, flower.id);
        db.send_flower(owner, flower.id, &instant_delivery("tok-gone"), now)
            .unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE flower_deliveries SET revoked_at = ?1 WHERE share_token = 'tok-gone'",
                params![now],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            db.open_delivery("tok-gone", now).unwrap_err(),
            StoreError::GiftRevoked
        ));

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE flower_deliveries SET revoked_at = NULL, expires_at = ?1
                 WHERE share_token = 'tok-gone'",
                params![now - Duration::hours(1)],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            db.open_delivery("tok-gone", now).unwrap_err(),
            StoreError::GiftExpired
        ));
    }

    #[test]
    fn sender_name_falls_back_through_profile_fields() {
        let db = test_db();
        let owner = seed_user(&db, "fallback@example.com");
        let now = Utc::now();

        let flower = db.create_flower(owner, "From Me", "rose", now).unwrap();
        force_ready(&db, flower.id);
        db.send_flower(owner, flower.id, &instant_delivery("tok-name"), now)
            .unwrap();

        let gift = db.open_delivery("tok-name", now).unwrap();
        assert_eq!(gift.sender_name, "fallback@example.com");

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET display_name = 'Robin', handle = 'robin' WHERE id = ?1",
                params![owner],
            )?;
            Ok(())
        })
        .unwrap();
        let gift = db.open_delivery("tok-name", now).unwrap();
        assert_eq!(gift.sender_name, "Robin");
    }

    #[test]
    fn otp_redeem_consumes_exactly_once() {
        let db = test_db();
        let now = Utc::now();

        db.insert_otp_code("user@example.com", "hash-a", now + Duration::minutes(10), now)
            .unwrap();

        let user = db.redeem_otp("user@example.com", "hash-a", now).unwrap();
        let user = user.expect("first redemption succeeds");
        assert_eq!(user.email.as_deref(), Some("user@example.com"));

        // Replay with the same code fails.
        assert!(db.redeem_otp("user@example.com", "hash-a", now).unwrap().is_none());

        // Redeeming again creates no duplicate user.
        db.insert_otp_code("user@example.com", "hash-b", now + Duration::minutes(10), now)
            .unwrap();
        let same = db
            .redeem_otp("user@example.com", "hash-b", now)
            .unwrap()
            .expect("second code valid");
        assert_eq!(same.id, user.id);
    }

    #[test]
    fn expired_or_unknown_otp_rejected_without_mutation() {
        let db = test_db();
        let now = Utc::now();

        db.insert_otp_code("user@example.com", "hash-old", now - Duration::minutes(1), now)
            .unwrap();

        assert!(db.redeem_otp("user@example.com", "hash-old", now).unwrap().is_none());
        assert!(db.redeem_otp("user@example.com", "hash-none", now).unwrap().is_none());

        // No user row was created by the failed attempts.
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn refresh_rotation_is_single_use() {
        let db = test_db();
        let user_id = seed_user(&db, "session@example.com");
        let now = Utc::now();

        let first = NewSession {
            jti: "jti-1".to_string(),
            user_agent: None,
            ip_address: None,
            expires_at: now + Duration::days(30),
        };
        db.create_refresh_session(user_id, &first, now).unwrap();

        let next = NewSession {
            jti: "jti-2".to_string(),
            user_agent: None,
            ip_address: None,
            expires_at: now + Duration::days(30),
        };
        let rotated = db.rotate_refresh_session("jti-1", &next, now).unwrap();
        assert_eq!(rotated, Some(user_id));

        let old = db.get_refresh_session("jti-1").unwrap().unwrap();
        assert!(old.is_revoked);
        assert!(old.revoked_at.is_some());

        // Reuse after rotation fails; the replacement session is live.
        let stale = NewSession {
            jti: "jti-3".to_string(),
            user_agent: None,
            ip_address: None,
            expires_at: now + Duration::days(30),
        };
        assert!(db.rotate_refresh_session("jti-1", &stale, now).unwrap().is_none());
        assert!(!db.get_refresh_session("jti-2").unwrap().unwrap().is_revoked);
    }

    #[test]
    fn expired_session_cannot_rotate() {
        let db = test_db();
        let user_id = seed_user(&db, "session@example.com");
        let now = Utc::now();

        let expired = NewSession {
            jti: "jti-exp".to_string(),
            user_agent: None,
            ip_address: None,
            expires_at: now - Duration::minutes(1),
        };
        db.create_refresh_session(user_id, &expired, now).unwrap();

        let next = NewSession {
            jti: "jti-next".to_string(),
            user_agent: None,
            ip_address: None,
            expires_at: now + Duration::days(30),
        };
        assert!(db.rotate_refresh_session("jti-exp", &next, now).unwrap().is_none());
        // Rejection does not mutate the presented row.
        assert!(!db.get_refresh_session("jti-exp").unwrap().unwrap().is_revoked);
    }

    #[test]
    fn revoke_is_idempotent_and_terminal() {
        let db = test_db();
        let user_id = seed_user(&db, "logout@example.com");
        let now = Utc::now();

        let session = NewSession {
            jti: "jti-out".to_string(),
            user_agent: Some("test-agent".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
            expires_at: now + Duration::days(30),
        };
        db.create_refresh_session(user_id, &session, now).unwrap();

        db.revoke_refresh_session("jti-out", now).unwrap();
        let row = db.get_refresh_session("jti-out").unwrap().unwrap();
        assert!(row.is_revoked);
        let revoked_at = row.revoked_at;

        // Second revoke is a silent no-op and keeps the original timestamp.
        db.revoke_refresh_session("jti-out", now + Duration::minutes(5))
            .unwrap();
        assert_eq!(db.get_refresh_session("jti-out").unwrap().unwrap().revoked_at, revoked_at);

        db.revoke_refresh_session("jti-unknown", now).unwrap();
    }
}
