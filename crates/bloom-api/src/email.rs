use std::time::Duration;

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("email provider returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not reach email provider: {0}")]
    Request(#[from] reqwest::Error),
}

/// Outbound OTP email via the Resend HTTP API. All calls are bounded by a
/// request timeout so a slow provider cannot hang the request.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl Mailer {
    pub fn new(api_key: String, from: String, base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            from,
            base_url,
        })
    }

    pub async fn send_otp(
        &self,
        to: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailerError> {
        let url = format!("{}/emails", self.base_url.trim_end_matches('/'));
        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": "Your Bloom login code",
            "text": format!(
                "Your Bloom verification code is {code}. It expires in {ttl_minutes} minutes."
            ),
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailerError::Status(response.status()));
        }
        Ok(())
    }
}
