use std::sync::Arc;

use bloom_db::Database;

use crate::config::Config;
use crate::email::Mailer;
use crate::rate_limit::FixedWindowLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    /// None when no email provider is configured; production refuses OTP
    /// requests in that case.
    pub mailer: Option<Mailer>,
    pub limiter: FixedWindowLimiter,
}
