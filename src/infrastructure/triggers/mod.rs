//! Trigger implementations and registry construction.

pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::config::TriggerConfig;
use crate::domain::ports::trigger::TriggerRegistry;
use crate::infrastructure::config::ConfigError;

pub use webhook::WebhookTrigger;

/// Build the trigger registry from configuration. Unknown kinds and
/// incomplete entries are configuration errors.
pub fn build_registry(configs: &[TriggerConfig]) -> Result<TriggerRegistry, ConfigError> {
    let mut registry = TriggerRegistry::new();
    for config in configs {
        match config.kind.as_str() {
            "webhook" => {
                let url = config
                    .url
                    .clone()
                    .ok_or_else(|| ConfigError::MissingTriggerUrl(config.id.clone()))?;
                let trigger = WebhookTrigger::new(
                    config.id.clone(),
                    url,
                    &config.method,
                    Duration::from_secs(config.timeout_secs),
                )?;
                registry.insert(config.id.clone(), Arc::new(trigger));
            }
            other => {
                return Err(ConfigError::UnknownTriggerKind {
                    id: config.id.clone(),
                    kind: other.to_string(),
                })
            }
        }
    }
    Ok(registry)
}
