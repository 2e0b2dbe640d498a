//! Scanner implementations and the kind registry.

pub mod annotations;
pub mod apps;
pub mod deploymentconfig;

use std::collections::HashMap;
use std::sync::Arc;

use kube::Client;

use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::WorkloadKind;
use crate::domain::ports::scanner::Scanner;
use crate::infrastructure::config::ConfigError;

pub use apps::{AppsScanner, DeploymentScanner, StatefulSetScanner};
pub use deploymentconfig::DeploymentConfigScanner;

type ScannerFactory = fn(Client, ScannerConfig) -> Arc<dyn Scanner>;

/// Mapping `kind → factory`, populated at startup.
#[derive(Default)]
pub struct ScannerRegistry {
    factories: HashMap<WorkloadKind, ScannerFactory>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all shipped scanner kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(WorkloadKind::Deployment, |client, config| {
            Arc::new(DeploymentScanner::new(client, config))
        });
        registry.register(WorkloadKind::StatefulSet, |client, config| {
            Arc::new(StatefulSetScanner::new(client, config))
        });
        registry.register(WorkloadKind::DeploymentConfig, |client, config| {
            Arc::new(DeploymentConfigScanner::new(client, config))
        });
        registry
    }

    pub fn register(&mut self, kind: WorkloadKind, factory: ScannerFactory) {
        self.factories.insert(kind, factory);
    }

    /// Instantiate a scanner for a configuration entry.
    pub fn create(
        &self,
        client: Client,
        config: ScannerConfig,
    ) -> Result<Arc<dyn Scanner>, ConfigError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ConfigError::UnknownScannerKind(config.kind.to_string()))?;
        Ok(factory(client, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_rejects_kind() {
        let registry = ScannerRegistry::new();
        assert!(registry.factories.is_empty());
    }

    #[test]
    fn test_builtin_registry_covers_all_kinds() {
        let registry = ScannerRegistry::builtin();
        for kind in [
            WorkloadKind::Deployment,
            WorkloadKind::StatefulSet,
            WorkloadKind::DeploymentConfig,
        ] {
            assert!(registry.factories.contains_key(&kind), "missing {kind}");
        }
    }
}
