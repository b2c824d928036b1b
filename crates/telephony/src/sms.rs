//! SMS provider client.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::debug;

use leadline_core::config::SmsConfig;

use crate::ClientError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmsDelivery {
    pub message_sid: String,
}

#[async_trait::async_trait]
pub trait SmsClient: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsDelivery, ClientError>;
}

pub struct HttpSmsClient {
    config: SmsConfig,
    client: Client,
}

impl HttpSmsClient {
    pub fn new(config: SmsConfig) -> Self {
        Self { config, client: Client::new() }
    }
}

#[async_trait::async_trait]
impl SmsClient for HttpSmsClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsDelivery, ClientError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url, self.config.account_sid
        );
        let form =
            [("To", to), ("From", self.config.from_number.as_str()), ("Body", body)];

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(self.config.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("sms.send", status.as_u16(), body));
        }

        let payload: Value = response.json().await?;
        let message_sid = payload
            .get("sid")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::decode("sms.send", "response missing message sid"))?;
        debug!(message_sid, "sms accepted by provider");

        Ok(SmsDelivery { message_sid: message_sid.to_string() })
    }
}

/// Test double that records sends and can fail a scripted number of
/// deliveries first.
#[derive(Default)]
pub struct RecordingSmsClient {
    sent: Mutex<Vec<(String, String)>>,
    failures_remaining: AtomicU32,
}

impl RecordingSmsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        let sent = self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.clone()
    }
}

#[async_trait::async_trait]
impl SmsClient for RecordingSmsClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsDelivery, ClientError> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::status("sms.send", 503, "scripted failure"));
        }
        let mut sent = self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.push((to.to_string(), body.to_string()));
        Ok(SmsDelivery { message_sid: format!("SM-test-{}", sent.len()) })
    }
}
