use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// Fixed-window request counter keyed by (client, group, window slot).
/// Counts live in process memory; restarting the server resets them.
#[derive(Default)]
pub struct FixedWindowLimiter {
    hits: Mutex<HashMap<(String, String, u64), u32>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, client_id: &str, group: &str, limit: u32, window_seconds: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.allow_at(client_id, group, limit, window_seconds, now)
    }

    fn allow_at(
        &self,
        client_id: &str,
        group: &str,
        limit: u32,
        window_seconds: u64,
        now: u64,
    ) -> bool {
        let slot = now / window_seconds.max(1);
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Drop counters from windows old enough that they can never match
        // again, so the map stays bounded by active clients.
        hits.retain(|(_, _, s), _| *s + 2 >= slot);

        let count = hits
            .entry((client_id.to_string(), group.to_string(), slot))
            .or_insert(0);
        *count += 1;
        *count <= limit
    }
}

pub async fn limit_auth_requests(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    // CORS preflights never count against the budget.
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let client = client_addr(&req);
    let allowed = state.limiter.allow(
        &client,
        "auth",
        state.config.auth_rate_limit,
        state.config.rate_window_seconds,
    );

    if !allowed {
        warn!(client = %client, "auth rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "detail": "Rate limit exceeded. Please retry later." })),
        )
            .into_response();
    }

    next.run(req).await
}

/// Best-effort client identity: the first x-forwarded-for hop when present,
/// else the socket peer address.
pub(crate) fn client_addr(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = FixedWindowLimiter::new();
        for _ in 0..3 {
            assert!(limiter.allow_at("1.2.3.4", "auth", 3, 60, 100));
        }
        assert!(!limiter.allow_at("1.2.3.4", "auth", 3, 60, 100));
    }

    #[test]
    fn fresh_window_resets_the_count() {
        let limiter = FixedWindowLimiter::new();
        assert!(limiter.allow_at("1.2.3.4", "auth", 1, 60, 100));
        assert!(!limiter.allow_at("1.2.3.4", "auth", 1, 60, 119));
        assert!(limiter.allow_at("1.2.3.4", "auth", 1, 60, 120));
    }

    #[test]
    fn clients_and_groups_are_independent() {
        let limiter = FixedWindowLimiter::new();
        assert!(limiter.allow_at("1.2.3.4", "auth", 1, 60, 100));
        assert!(limiter.allow_at("5.6.7.8", "auth", 1, 60, 100));
        assert!(limiter.allow_at("1.2.3.4", "other", 1, 60, 100));
        assert!(!limiter.allow_at("1.2.3.4", "auth", 1, 60, 100));
    }

    #[test]
    fn stale_slots_are_evicted() {
        let limiter = FixedWindowLimiter::new();
        assert!(limiter.allow_at("1.2.3.4", "auth", 1, 60, 60));
        // Three windows later the old slot is beyond the retention horizon.
        assert!(limiter.allow_at("5.6.7.8", "auth", 1, 60, 240));
        let hits = limiter.hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.keys().all(|(_, _, slot)| *slot == 4));
    }
}
