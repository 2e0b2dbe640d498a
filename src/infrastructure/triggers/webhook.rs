//! HTTP webhook trigger.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::domain::ports::trigger::Trigger;
use crate::infrastructure::config::ConfigError;

#[derive(Debug)]
pub struct WebhookTrigger {
    id: String,
    client: reqwest::Client,
    method: Method,
    url: String,
}

impl WebhookTrigger {
    pub fn new(
        id: String,
        url: String,
        method: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            ConfigError::InvalidTriggerMethod {
                id: id.clone(),
                method: method.to_string(),
            }
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ConfigError::TriggerClient(id.clone(), err.to_string()))?;
        Ok(Self {
            id,
            client,
            method,
            url,
        })
    }
}

#[async_trait]
impl Trigger for WebhookTrigger {
    async fn fire(&self) -> Result<()> {
        debug!(trigger = %self.id, url = %self.url, "firing webhook");
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .send()
            .await
            .with_context(|| format!("webhook '{}' request failed", self.id))?;

        if !response.status().is_success() {
            bail!("webhook '{}' returned {}", self.id, response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_method_rejected() {
        let result = WebhookTrigger::new(
            "notify".to_string(),
            "http://hooks.internal/notify".to_string(),
            "GET POST",
            Duration::from_secs(1),
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidTriggerMethod { .. }
        ));
    }

    #[tokio::test]
    async fn test_fire_posts_to_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(200)
            .create_async()
            .await;

        let trigger = WebhookTrigger::new(
            "notify".to_string(),
            format!("{}/notify", server.url()),
            "post",
            Duration::from_secs(1),
        )
        .unwrap();

        trigger.fire().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fire_fails_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/notify")
            .with_status(500)
            .create_async()
            .await;

        let trigger = WebhookTrigger::new(
            "notify".to_string(),
            format!("{}/notify", server.url()),
            "POST",
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(trigger.fire().await.is_err());
    }
}
