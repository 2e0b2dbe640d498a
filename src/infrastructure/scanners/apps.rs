//! Scanners for the typed apps/v1 workloads (Deployment, StatefulSet).
//!
//! Both kinds share the exact same access pattern, so one generic scanner
//! covers them; the OpenShift DeploymentConfig needs the dynamic API and
//! lives in its own module.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::{ListParams, Patch, PatchParams, WatchEvent, WatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::errors::BackendError;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::{Object, SavedState, WorkloadKind};
use crate::domain::ports::scanner::{ObjectEvent, Scanner, WatchSource, WatchStream};
use crate::infrastructure::scanners::annotations::{
    object_from_parts, state_from_annotations, AnnotationError, STATE_ANNOTATION,
};

/// A typed apps/v1 workload the generic scanner can manage.
pub trait AppsWorkload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    const KIND: WorkloadKind;

    fn replicas(&self) -> Option<i32>;
}

impl AppsWorkload for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|spec| spec.replicas)
    }
}

impl AppsWorkload for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|spec| spec.replicas)
    }
}

pub struct AppsScanner<K> {
    client: Client,
    config: ScannerConfig,
    _workload: PhantomData<K>,
}

pub type DeploymentScanner = AppsScanner<Deployment>;
pub type StatefulSetScanner = AppsScanner<StatefulSet>;

impl<K: AppsWorkload> AppsScanner<K> {
    pub fn new(client: Client, mut config: ScannerConfig) -> Self {
        config.kind = K::KIND;
        Self {
            client,
            config,
            _workload: PhantomData,
        }
    }

    /// Api scoped to the configured namespace (or all namespaces).
    fn scan_api(&self) -> Api<K> {
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Api scoped to a concrete object's namespace.
    fn object_api(&self, obj: &Object) -> Api<K> {
        Api::namespaced(self.client.clone(), &obj.namespace)
    }

    fn list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(label) = &self.config.label {
            params = params.labels(label);
        }
        params
    }

    fn watch_params(&self) -> WatchParams {
        let mut params = WatchParams::default();
        if let Some(label) = &self.config.label {
            params = params.labels(label);
        }
        params
    }
}

fn to_object<K: AppsWorkload>(
    config: &ScannerConfig,
    workload: &K,
) -> Result<Object, AnnotationError> {
    object_from_parts(
        config,
        workload.namespace().unwrap_or_default(),
        workload.uid().unwrap_or_default(),
        workload.name_any(),
        workload.annotations(),
        workload.replicas().unwrap_or(0),
    )
}

#[async_trait]
impl<K: AppsWorkload> Scanner for AppsScanner<K> {
    fn kind(&self) -> WorkloadKind {
        K::KIND
    }

    fn config(&self) -> &ScannerConfig {
        &self.config
    }

    async fn list(&self) -> Result<Vec<Object>, BackendError> {
        let listing = self.scan_api().list(&self.list_params()).await?;
        let mut objects = Vec::new();
        for workload in listing.items {
            match to_object(&self.config, &workload) {
                Ok(obj) => {
                    if !obj.schedule.is_empty() {
                        objects.push(obj);
                    }
                }
                Err(err) => warn!(
                    kind = %K::KIND,
                    name = %workload.name_any(),
                    error = %err,
                    "skipping workload with malformed annotations"
                ),
            }
        }
        Ok(objects)
    }

    async fn scale(&self, obj: &Object, replicas: i32) -> Result<(), BackendError> {
        let current = self.object_api(obj).get(&obj.name).await?;
        if current.replicas() == Some(replicas) {
            debug!(
                namespace = %obj.namespace,
                name = %obj.name,
                replicas,
                "already at target replica count"
            );
            return Ok(());
        }

        info!(namespace = %obj.namespace, name = %obj.name, replicas, "scaling workload");
        let patch = json!({"spec": {"replicas": replicas}});
        self.object_api(obj)
            .patch(&obj.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn save_state(&self, obj: &Object) -> Result<i32, BackendError> {
        let current = self.object_api(obj).get(&obj.name).await?;
        let replicas = current.replicas().ok_or_else(|| BackendError::Malformed {
            kind: K::KIND,
            reason: format!("{}/{} has no replica count", obj.namespace, obj.name),
        })?;

        let patch = json!({"metadata": {"annotations": {STATE_ANNOTATION: replicas.to_string()}}});
        self.object_api(obj)
            .patch(&obj.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(namespace = %obj.namespace, name = %obj.name, replicas, "persisted replica state");
        Ok(replicas)
    }

    async fn load_state(&self, obj: &Object) -> Result<Option<SavedState>, BackendError> {
        let current = self.object_api(obj).get(&obj.name).await?;
        Ok(state_from_annotations(current.annotations()).unwrap_or_else(|err| {
            warn!(
                namespace = %obj.namespace,
                name = %obj.name,
                error = %err,
                "ignoring malformed state annotation"
            );
            None
        }))
    }

    fn as_watch_source(&self) -> Option<&dyn WatchSource> {
        Some(self)
    }
}

#[async_trait]
impl<K: AppsWorkload> WatchSource for AppsScanner<K> {
    async fn watch(&self) -> Result<WatchStream, BackendError> {
        let events = self.scan_api().watch(&self.watch_params(), "0").await?;
        let config = self.config.clone();
        Ok(events
            .map(move |item| map_watch_event(&config, item))
            .filter_map(|mapped| async move { mapped })
            .boxed())
    }
}

fn map_watch_event<K: AppsWorkload>(
    config: &ScannerConfig,
    item: Result<WatchEvent<K>, kube::Error>,
) -> Option<Result<ObjectEvent, BackendError>> {
    match item {
        Ok(WatchEvent::Added(workload) | WatchEvent::Modified(workload)) => {
            to_event(config, &workload, false)
        }
        Ok(WatchEvent::Deleted(workload)) => to_event(config, &workload, true),
        Ok(WatchEvent::Bookmark(_)) => None,
        Ok(WatchEvent::Error(err)) => Some(Err(BackendError::Watch(err.to_string()))),
        Err(err) => Some(Err(BackendError::Watch(err.to_string()))),
    }
}

/// Deletions always remove; adds and modifications remove when the rules
/// are gone and (re-)add otherwise.
fn to_event<K: AppsWorkload>(
    config: &ScannerConfig,
    workload: &K,
    deleted: bool,
) -> Option<Result<ObjectEvent, BackendError>> {
    match to_object(config, workload) {
        Ok(obj) => {
            if deleted || obj.schedule.is_empty() {
                Some(Ok(ObjectEvent::Remove(obj)))
            } else {
                Some(Ok(ObjectEvent::Add(obj)))
            }
        }
        Err(err) => {
            warn!(
                kind = %K::KIND,
                name = %workload.name_any(),
                error = %err,
                "dropping watch event with malformed annotations"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    use crate::infrastructure::scanners::annotations::SCHEDULE_ANNOTATION;

    fn deployment(name: &str, annotations: &[(&str, &str)], replicas: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("shop".to_string()),
                uid: Some(format!("uid-{name}")),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }
    }

    fn config() -> ScannerConfig {
        ScannerConfig {
            kind: WorkloadKind::Deployment,
            namespace: Some("shop".to_string()),
            label: None,
            schedule: vec![],
        }
    }

    #[test]
    fn test_to_object_from_metadata() {
        let workload = deployment(
            "frontend",
            &[(SCHEDULE_ANNOTATION, "0 22 * * * replicas=0")],
            3,
        );
        let obj = to_object(&config(), &workload).unwrap();
        assert_eq!(obj.namespace, "shop");
        assert_eq!(obj.uid, "uid-frontend");
        assert_eq!(obj.replicas, 3);
        assert_eq!(obj.schedule.len(), 1);
    }

    #[test]
    fn test_watch_event_mapping() {
        let cfg = config();
        let managed = deployment(
            "frontend",
            &[(SCHEDULE_ANNOTATION, "0 22 * * * replicas=0")],
            3,
        );
        let unmanaged = deployment("backend", &[], 1);

        let added = map_watch_event(&cfg, Ok(WatchEvent::Added(managed.clone())));
        assert!(matches!(added, Some(Ok(ObjectEvent::Add(_)))));

        // Rules gone on a modify downgrades to a removal.
        let modified = map_watch_event(&cfg, Ok(WatchEvent::Modified(unmanaged.clone())));
        assert!(matches!(modified, Some(Ok(ObjectEvent::Remove(_)))));

        let deleted = map_watch_event(&cfg, Ok(WatchEvent::Deleted(managed)));
        assert!(matches!(deleted, Some(Ok(ObjectEvent::Remove(_)))));
    }

    #[test]
    fn test_watch_event_bad_annotations_dropped() {
        let cfg = config();
        let broken = deployment("frontend", &[(SCHEDULE_ANNOTATION, "not a rule")], 3);
        assert!(map_watch_event(&cfg, Ok(WatchEvent::Modified(broken))).is_none());
    }
}
