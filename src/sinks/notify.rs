use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{MessageSink, SinkError};

/// Push notifications must never hold a finished run open.
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// LINE-Notify-style push client: bearer token, form-encoded message.
pub struct NotifyClient {
    client: HttpClient,
    api_url: String,
    token: String,
    recipient: Option<String>,
}

impl NotifyClient {
    pub fn new(
        api_url: String,
        token: String,
        recipient: Option<String>,
    ) -> Result<Self, SinkError> {
        let client = HttpClient::builder().timeout(PUSH_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url,
            token,
            recipient,
        })
    }
}

#[async_trait]
impl MessageSink for NotifyClient {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn push(&self, message: &str) -> Result<(), SinkError> {
        let mut form = vec![("message", message.to_string())];
        if let Some(recipient) = &self.recipient {
            form.push(("to", recipient.clone()));
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .form(&form)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable>".to_string());
            Err(SinkError::Api {
                context: "push notification".to_string(),
                status,
                body,
            })
        }
    }
}
