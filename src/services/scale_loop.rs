//! The scale loop.
//!
//! Every tick the loop snapshots the object store, computes which rules
//! fired in the window `(past, now]`, applies save/restore state handling
//! and replica scaling through the owning scanner, and finally fires the
//! triggers named by the tick's rules. `past`/`now` are plain instants so
//! tests drive the loop with virtual time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::domain::errors::StateError;
use crate::domain::models::object::{Object, SavedState};
use crate::domain::models::schedule::StateTransition;
use crate::domain::ports::scanner::Scanner;
use crate::domain::ports::trigger::TriggerRegistry;
use crate::infrastructure::metrics::Metrics;
use crate::services::object_store::ObjectStore;

/// One due firing within a tick window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleEvent {
    pub at: DateTime<Local>,
    pub obj_idx: usize,
    pub sched_idx: usize,
}

pub struct ScaleLoop {
    store: Arc<ObjectStore>,
    scanners: Vec<Arc<dyn Scanner>>,
    triggers: Arc<TriggerRegistry>,
    metrics: Arc<Metrics>,
}

impl ScaleLoop {
    pub fn new(
        store: Arc<ObjectStore>,
        scanners: Vec<Arc<dyn Scanner>>,
        triggers: Arc<TriggerRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            scanners,
            triggers,
            metrics,
        }
    }

    /// Drive ticks at a fixed cadence until shutdown.
    ///
    /// `past` starts one interval before startup so a rule firing exactly
    /// at startup still triggers on the first tick.
    pub async fn run(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let window = chrono::Duration::from_std(interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let mut past = Local::now() - window;
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval fires immediately; skip it so
        // the first window has the configured width.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "scale loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Local::now();
                    self.tick(past, now).await;
                    past = now;
                }
                _ = shutdown.recv() => {
                    info!("scale loop stopped");
                    return;
                }
            }
        }
    }

    /// Process one tick window `(past, now]`.
    pub async fn tick(&self, past: DateTime<Local>, now: DateTime<Local>) {
        let mut objects = self.store.snapshot();
        let events = due_events(&objects, past, now);
        if events.is_empty() {
            debug!(%past, %now, "no due scale events");
            return;
        }
        debug!(%past, %now, events = events.len(), "processing scale events");

        let mut trigger_ids: Vec<String> = Vec::new();
        for event in &events {
            for id in objects[event.obj_idx].schedule[event.sched_idx].triggers() {
                if !trigger_ids.iter().any(|seen| seen == id) {
                    trigger_ids.push(id.clone());
                }
            }
            self.handle_event(&mut objects, event).await;
        }

        self.fire_triggers(trigger_ids).await;
    }

    /// Apply one event: resolve the rule's state transition, then scale.
    async fn handle_event(&self, objects: &mut [Object], event: &ScaleEvent) {
        let sched = objects[event.obj_idx].schedule[event.sched_idx].clone();
        let key = objects[event.obj_idx].key();
        let namespace = objects[event.obj_idx].namespace.clone();
        let name = objects[event.obj_idx].name.clone();

        let Some(scanner) = self.scanner_for(&objects[event.obj_idx]) else {
            warn!(
                %namespace,
                %name,
                kind = %objects[event.obj_idx].kind,
                "no scanner owns this object, skipping event"
            );
            return;
        };

        let mut restore = false;
        match sched.state() {
            Some(StateTransition::Save) => {
                let saved = scanner.save_state(&objects[event.obj_idx]).await;
                match saved {
                    Ok(replicas) => {
                        let state = SavedState { replicas };
                        self.store.set_state(&key, state);
                        objects[event.obj_idx].state = Some(state);
                        debug!(%namespace, %name, replicas, "saved replica state");
                    }
                    Err(err) => {
                        error!(%namespace, %name, error = %err, "failed to save state");
                    }
                }
            }
            Some(StateTransition::Restore) => {
                if objects[event.obj_idx].state.is_none() {
                    // The annotation may hold state from a previous run
                    // this process never observed.
                    let loaded = scanner.load_state(&objects[event.obj_idx]).await;
                    match loaded {
                        Ok(Some(state)) => {
                            self.store.set_state(&key, state);
                            objects[event.obj_idx].state = Some(state);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(%namespace, %name, error = %err, "failed to load saved state");
                        }
                    }
                }
                if objects[event.obj_idx].state.is_some() {
                    restore = true;
                } else {
                    let err = StateError { namespace, name };
                    error!(error = %err, "restore skipped");
                    return;
                }
            }
            None => {}
        }

        if restore {
            if let Some(state) = objects[event.obj_idx].state {
                self.apply_scale(&scanner, &objects[event.obj_idx], state.replicas)
                    .await;
                objects[event.obj_idx].replicas = state.replicas;
            }
            return;
        }

        // Regular scaling; a rule without replicas (pure state or pure
        // trigger) has nothing further to do.
        if let Ok(replicas) = sched.replicas() {
            let replicas = i32::try_from(replicas).unwrap_or(i32::MAX);
            self.apply_scale(&scanner, &objects[event.obj_idx], replicas).await;
            objects[event.obj_idx].replicas = replicas;
        }
    }

    async fn apply_scale(&self, scanner: &Arc<dyn Scanner>, obj: &Object, replicas: i32) {
        match scanner.scale(obj, replicas).await {
            Ok(()) => {
                self.metrics.scale_event.inc();
                self.metrics
                    .set_replicas(&obj.namespace, scanner.kind().as_str(), i64::from(replicas));
            }
            Err(err) => {
                self.metrics.scale_error.inc();
                error!(
                    namespace = %obj.namespace,
                    name = %obj.name,
                    replicas,
                    error = %err,
                    "failed to scale workload"
                );
            }
        }
    }

    /// Fire each trigger id once, sequentially, swallowing failures.
    async fn fire_triggers(&self, trigger_ids: Vec<String>) {
        for id in trigger_ids {
            match self.triggers.get(&id) {
                Some(trigger) => {
                    if let Err(err) = trigger.fire().await {
                        warn!(trigger = %id, error = %err, "trigger failed");
                    } else {
                        debug!(trigger = %id, "trigger fired");
                    }
                }
                None => warn!(trigger = %id, "rule names an unregistered trigger"),
            }
        }
    }

    /// The scanner owning an object: matching kind, and matching namespace
    /// scope (a scanner without a namespace owns all of them).
    fn scanner_for(&self, obj: &Object) -> Option<Arc<dyn Scanner>> {
        self.scanners
            .iter()
            .find(|scanner| {
                scanner.kind() == obj.kind
                    && scanner
                        .config()
                        .namespace
                        .as_ref()
                        .is_none_or(|ns| *ns == obj.namespace)
            })
            .cloned()
    }
}

/// Compute the events due in `(past, now]`, across all objects, ordered by
/// firing time with ties kept in input order (object order, then rule
/// order within the object).
pub fn due_events(objects: &[Object], past: DateTime<Local>, now: DateTime<Local>) -> Vec<ScaleEvent> {
    let mut events = Vec::new();
    for (obj_idx, obj) in objects.iter().enumerate() {
        for (sched_idx, sched) in obj.schedule.iter().enumerate() {
            let mut cursor = past;
            loop {
                let next = match sched.next_fire_after(cursor) {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(
                            namespace = %obj.namespace,
                            name = %obj.name,
                            error = %err,
                            "cannot compute next firing time"
                        );
                        break;
                    }
                };
                if next > now {
                    break;
                }
                events.push(ScaleEvent {
                    at: next,
                    obj_idx,
                    sched_idx,
                });
                // Guard against a non-advancing firing time; a day step is
                // safe with minute-granular rules.
                cursor = if next > cursor {
                    next
                } else {
                    cursor + chrono::Duration::days(1)
                };
            }
        }
    }
    events.sort_by_key(|event| event.at);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{test_metrics, CountingTrigger, MockScanner};
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn object(uid: &str, replicas: i32, rules: &[&str]) -> Object {
        Object {
            namespace: "shop".to_string(),
            uid: uid.to_string(),
            name: format!("app-{uid}"),
            kind: crate::domain::models::object::WorkloadKind::Deployment,
            schedule: rules.iter().map(|r| r.parse().unwrap()).collect(),
            replicas,
            state: None,
        }
    }

    fn scale_loop(
        scanner: &Arc<MockScanner>,
        triggers: TriggerRegistry,
    ) -> (ScaleLoop, Arc<ObjectStore>, Arc<Metrics>) {
        let store = Arc::new(ObjectStore::new());
        let metrics = test_metrics();
        let scanners: Vec<Arc<dyn Scanner>> = vec![scanner.clone()];
        let scale = ScaleLoop::new(
            store.clone(),
            scanners,
            Arc::new(triggers),
            metrics.clone(),
        );
        (scale, store, metrics)
    }

    #[test]
    fn test_due_events_single_firing() {
        let objects = vec![object("a", 3, &["0 22 * * * replicas=0"])];
        let events = due_events(&objects, local(2024, 5, 1, 21, 59), local(2024, 5, 1, 22, 29));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].at, local(2024, 5, 1, 22, 0));
    }

    #[test]
    fn test_due_events_outside_window() {
        let objects = vec![object("a", 3, &["0 22 * * * replicas=0"])];
        let events = due_events(&objects, local(2024, 5, 1, 22, 1), local(2024, 5, 1, 22, 31));
        assert!(events.is_empty());
    }

    #[test]
    fn test_due_events_chronological_across_days() {
        let objects = vec![object(
            "a",
            5,
            &["0 22 * * * state=save replicas=0", "0 6 * * * state=restore"],
        )];
        // Paused from 21:59 to 06:01 the next day: both rules fire once,
        // save before restore.
        let events = due_events(&objects, local(2024, 5, 1, 21, 59), local(2024, 5, 2, 6, 1));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sched_idx, 0);
        assert_eq!(events[0].at, local(2024, 5, 1, 22, 0));
        assert_eq!(events[1].sched_idx, 1);
        assert_eq!(events[1].at, local(2024, 5, 2, 6, 0));
    }

    #[test]
    fn test_due_events_deterministic_and_ordered() {
        let objects = vec![
            object("a", 1, &["30 4 * * * replicas=1"]),
            object("b", 1, &["0 4 * * * replicas=2"]),
        ];
        let past = local(2024, 5, 1, 3, 0);
        let now = local(2024, 5, 1, 5, 0);
        let first = due_events(&objects, past, now);
        let second = due_events(&objects, past, now);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(first[0].obj_idx, 1);
    }

    #[test]
    fn test_due_events_consecutive_windows_no_miss_no_dup() {
        let objects = vec![object("a", 3, &["*/15 * * * * replicas=1"])];
        let t0 = local(2024, 5, 1, 10, 0);
        let t1 = local(2024, 5, 1, 10, 29);
        let t2 = local(2024, 5, 1, 11, 0);

        let joined: Vec<_> = due_events(&objects, t0, t1)
            .into_iter()
            .chain(due_events(&objects, t1, t2))
            .map(|e| e.at)
            .collect();
        let whole: Vec<_> = due_events(&objects, t0, t2).into_iter().map(|e| e.at).collect();
        assert_eq!(joined, whole);
        assert_eq!(joined.len(), 4); // 10:15, 10:30, 10:45, 11:00
    }

    #[tokio::test]
    async fn test_simple_downscale() {
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            3,
            &["0 22 * * * replicas=0"],
        )]));
        let (scale, store, metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        scale
            .tick(local(2024, 5, 1, 21, 59), local(2024, 5, 1, 22, 29))
            .await;

        assert_eq!(scanner.scale_calls(), vec![("app-a".to_string(), 0)]);
        assert_eq!(metrics.scale_event.get(), 1);
        assert_eq!(metrics.scale_error.get(), 0);
    }

    #[tokio::test]
    async fn test_save_then_restore_across_ticks() {
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            5,
            &["0 22 * * * state=save replicas=0", "0 6 * * * state=restore"],
        )]));
        let (scale, store, metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        // Evening tick: save 5, scale to 0.
        scale
            .tick(local(2024, 5, 1, 21, 59), local(2024, 5, 1, 22, 29))
            .await;
        assert_eq!(scanner.scale_calls(), vec![("app-a".to_string(), 0)]);
        assert_eq!(
            store.snapshot()[0].state,
            Some(SavedState { replicas: 5 })
        );

        // Morning tick: restore to 5.
        scale
            .tick(local(2024, 5, 2, 5, 59), local(2024, 5, 2, 6, 29))
            .await;
        assert_eq!(
            scanner.scale_calls(),
            vec![("app-a".to_string(), 0), ("app-a".to_string(), 5)]
        );
        assert_eq!(metrics.scale_event.get(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_save_skips() {
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            5,
            &["0 6 * * * state=restore"],
        )]));
        let (scale, store, metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        scale
            .tick(local(2024, 5, 2, 5, 59), local(2024, 5, 2, 6, 29))
            .await;

        assert!(scanner.scale_calls().is_empty());
        assert_eq!(metrics.scale_event.get(), 0);
        assert_eq!(metrics.scale_error.get(), 0);
    }

    #[tokio::test]
    async fn test_missed_window_save_before_restore() {
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            5,
            &["0 22 * * * state=save replicas=0", "0 6 * * * state=restore"],
        )]));
        let (scale, store, _metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        // One tick covering the whole pause: exactly two scale calls, the
        // save/down-scale first, then the restore of the just-saved value.
        scale
            .tick(local(2024, 5, 1, 21, 59), local(2024, 5, 2, 6, 1))
            .await;

        assert_eq!(
            scanner.scale_calls(),
            vec![("app-a".to_string(), 0), ("app-a".to_string(), 5)]
        );
        assert_eq!(scanner.current_replicas("app-a"), 5);
    }

    #[tokio::test]
    async fn test_restore_loads_persisted_state() {
        // Simulates a controller restart: the store has no in-memory
        // state, but the workload annotation still does.
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            0,
            &["0 6 * * * state=restore"],
        )]));
        scanner.set_saved("app-a", 4);
        let (scale, store, _metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        scale
            .tick(local(2024, 5, 2, 5, 59), local(2024, 5, 2, 6, 29))
            .await;

        assert_eq!(scanner.scale_calls(), vec![("app-a".to_string(), 4)]);
    }

    #[tokio::test]
    async fn test_scale_error_counted() {
        let scanner = Arc::new(
            MockScanner::new(vec![object("a", 3, &["0 22 * * * replicas=0"])]).failing_scale(),
        );
        let (scale, store, metrics) = scale_loop(&scanner, TriggerRegistry::new());
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        scale
            .tick(local(2024, 5, 1, 21, 59), local(2024, 5, 1, 22, 29))
            .await;

        assert_eq!(metrics.scale_event.get(), 0);
        assert_eq!(metrics.scale_error.get(), 1);
    }

    #[tokio::test]
    async fn test_triggers_deduplicated_within_tick() {
        let scanner = Arc::new(MockScanner::new(vec![object(
            "a",
            3,
            &[
                "0 22 * * * replicas=0 triggers=notify",
                "15 22 * * * replicas=1 triggers=notify",
            ],
        )]));
        let trigger = Arc::new(CountingTrigger::new());
        let mut registry = TriggerRegistry::new();
        registry.insert("notify", trigger.clone());
        let (scale, store, _metrics) = scale_loop(&scanner, registry);
        for obj in scanner.list().await.unwrap() {
            store.upsert(obj);
        }

        scale
            .tick(local(2024, 5, 1, 21, 59), local(2024, 5, 1, 22, 30))
            .await;

        assert_eq!(scanner.scale_calls().len(), 2);
        assert_eq!(trigger.fired(), 1);
    }
}
