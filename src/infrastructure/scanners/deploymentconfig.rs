//! OpenShift DeploymentConfig scanner.
//!
//! DeploymentConfigs (`apps.openshift.io/v1`) are not part of the typed
//! k8s-openapi surface, so this scanner goes through the dynamic API.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{
    ApiResource, DynamicObject, ListParams, Patch, PatchParams, WatchEvent, WatchParams,
};
use kube::core::GroupVersionKind;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::errors::BackendError;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::{Object, SavedState, WorkloadKind};
use crate::domain::ports::scanner::{ObjectEvent, Scanner, WatchSource, WatchStream};
use crate::infrastructure::scanners::annotations::{
    object_from_parts, state_from_annotations, AnnotationError, STATE_ANNOTATION,
};

fn deploymentconfig_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "apps.openshift.io",
        "v1",
        "DeploymentConfig",
    ))
}

pub struct DeploymentConfigScanner {
    client: Client,
    config: ScannerConfig,
    resource: ApiResource,
}

impl DeploymentConfigScanner {
    pub fn new(client: Client, mut config: ScannerConfig) -> Self {
        config.kind = WorkloadKind::DeploymentConfig;
        Self {
            client,
            config,
            resource: deploymentconfig_resource(),
        }
    }

    fn scan_api(&self) -> Api<DynamicObject> {
        match &self.config.namespace {
            Some(namespace) => {
                Api::namespaced_with(self.client.clone(), namespace, &self.resource)
            }
            None => Api::all_with(self.client.clone(), &self.resource),
        }
    }

    fn object_api(&self, obj: &Object) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &obj.namespace, &self.resource)
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

fn replicas_of(workload: &DynamicObject) -> Option<i32> {
    workload
        .data
        .get("spec")?
        .get("replicas")?
        .as_i64()
        .and_then(|replicas| i32::try_from(replicas).ok())
}

fn to_object(
    config: &ScannerConfig,
    workload: &DynamicObject,
) -> Result<Object, AnnotationError> {
    object_from_parts(
        config,
        workload.namespace().unwrap_or_default(),
        workload.uid().unwrap_or_default(),
        workload.name_any(),
        workload.annotations(),
        replicas_of(workload).unwrap_or(0),
    )
}

#[async_trait]
impl Scanner for DeploymentConfigScanner {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::DeploymentConfig
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
                    kind = %WorkloadKind::DeploymentConfig,
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
        if replicas_of(&current) == Some(replicas) {
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
        let replicas = replicas_of(&current).ok_or_else(|| BackendError::Malformed {
            kind: WorkloadKind::DeploymentConfig,
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
impl WatchSource for DeploymentConfigScanner {
    async fn watch(&self) -> Result<WatchStream, BackendError> {
        let events = self.scan_api().watch(&self.watch_params(), "0").await?;
        let config = self.config.clone();
        Ok(events
            .map(move |item| map_watch_event(&config, item))
            .filter_map(|mapped| async move { mapped })
            .boxed())
    }
}

fn map_watch_event(
    config: &ScannerConfig,
    item: Result<WatchEvent<DynamicObject>, kube::Error>,
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

fn to_event(
    config: &ScannerConfig,
    workload: &DynamicObject,
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
                kind = %WorkloadKind::DeploymentConfig,
                name = %workload.name_any(),
                error = %err,
                "dropping watch event with malformed annotations"
            );
            None
        }
    }
}
