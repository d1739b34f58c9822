// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the controller-lifecycle manager

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::reconcilers::fakes::FakeCache;
    use crate::registry::AddressableInfo;
    use serde_json::json;
    use std::sync::Mutex;

    /// Spawns loops that idle until cancelled and remembers what it spawned.
    #[derive(Default)]
    struct RecordingSpawner {
        spawned: Mutex<Vec<(TypeCoordinates, CancellationToken)>>,
    }

    impl RecordingSpawner {
        fn count(&self) -> usize {
            self.spawned.lock().unwrap().len()
        }

        fn token(&self, index: usize) -> CancellationToken {
            self.spawned.lock().unwrap()[index].1.clone()
        }

        fn tokens(&self) -> Vec<CancellationToken> {
            self.spawned.lock().unwrap().iter().map(|(_, token)| token.clone()).collect()
        }
    }

    impl LoopSpawner for RecordingSpawner {
        fn spawn(&self, coordinates: TypeCoordinates, token: CancellationToken) -> JoinHandle<()> {
            self.spawned.lock().unwrap().push((coordinates, token.clone()));
            tokio::spawn(token.cancelled_owned())
        }
    }

    fn crd(metadata: serde_json::Value, scope: &str, versions: serde_json::Value) -> CustomResourceDefinition {
        let mut meta = json!({
            "name": "widgets.example.io",
            "labels": {"duck.knative.dev/addressable": "true"}
        });
        if let (Some(target), Some(extra)) = (meta.as_object_mut(), metadata.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": meta,
            "spec": {
                "group": "example.io",
                "names": {"kind": "Widget", "plural": "widgets"},
                "scope": scope,
                "versions": versions
            }
        }))
        .unwrap()
    }

    fn widgets_crd() -> CustomResourceDefinition {
        crd(
            json!({}),
            "Namespaced",
            json!([{"name": "v1", "served": true, "storage": true}]),
        )
    }

    fn deleting(mut definition: CustomResourceDefinition) -> CustomResourceDefinition {
        definition.metadata.deletion_timestamp = serde_json::from_value(json!("2025-01-01T00:00:00Z")).unwrap();
        definition
    }

    struct Harness {
        cache: Arc<FakeCache<CustomResourceDefinition>>,
        registry: Arc<AddressableRegistry>,
        spawner: Arc<RecordingSpawner>,
        root: CancellationToken,
        manager: Arc<AddressableCrdReconciler>,
    }

    fn harness(crds: Vec<CustomResourceDefinition>) -> Harness {
        let cache = Arc::new(FakeCache::with(crds));
        let registry = Arc::new(AddressableRegistry::new());
        let spawner = Arc::new(RecordingSpawner::default());
        let root = CancellationToken::new();
        let manager = Arc::new(AddressableCrdReconciler::new(
            cache.clone(),
            registry.clone(),
            spawner.clone(),
            root.clone(),
        ));
        Harness {
            cache,
            registry,
            spawner,
            root,
            manager,
        }
    }

    fn widgets(version: &str) -> TypeCoordinates {
        TypeCoordinates {
            group: "example.io".to_string(),
            version: version.to_string(),
            kind: "Widget".to_string(),
            plural: "widgets".to_string(),
        }
    }

    #[tokio::test]
    async fn test_addressable_crd_starts_and_deletion_stops_loop() {
        let h = harness(vec![widgets_crd()]);

        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Started(widgets("v1")));
        assert_eq!(h.registry.lookup(&widgets("v1").gvk()), Some(widgets("v1")));
        assert!(h.registry.is_running("widgets.example.io"));
        assert_eq!(h.spawner.count(), 1);

        h.cache.insert(deleting(widgets_crd()));
        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Stopped);
        assert!(h.registry.lookup(&widgets("v1").gvk()).is_none());
        assert!(!h.registry.is_running("widgets.example.io"));
        assert!(h.spawner.token(0).is_cancelled());
        assert!(!h.root.is_cancelled());
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let h = harness(vec![widgets_crd()]);

        h.manager.reconcile("widgets.example.io").await.unwrap();
        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::AlreadyRunning);
        assert_eq!(h.spawner.count(), 1);
    }

    #[tokio::test]
    async fn test_loop_binds_first_served_version_and_registers_all() {
        let h = harness(vec![crd(
            json!({}),
            "Namespaced",
            json!([
                {"name": "v1alpha1", "served": false, "storage": false},
                {"name": "v1beta1", "served": true, "storage": false},
                {"name": "v1", "served": true, "storage": true}
            ]),
        )]);

        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Started(widgets("v1beta1")));
        assert!(h.registry.is_gvk_addressable(&widgets("v1beta1").gvk()));
        assert!(h.registry.is_gvk_addressable(&widgets("v1").gvk()));
        assert!(!h.registry.is_gvk_addressable(&widgets("v1alpha1").gvk()));
        assert_eq!(
            h.registry.running_coordinates("widgets.example.io"),
            Some(widgets("v1beta1"))
        );
    }

    #[tokio::test]
    async fn test_no_served_version_registers_nothing() {
        let h = harness(vec![crd(
            json!({}),
            "Namespaced",
            json!([{"name": "v1", "served": false, "storage": true}]),
        )]);

        let err = h.manager.reconcile("widgets.example.io").await.unwrap_err();

        assert!(matches!(err, AutoTriggerError::NoServedVersion { ref name } if name == "widgets.example.io"));
        assert!(!err.is_retriable());
        assert!(h.registry.running_keys().is_empty());
        assert!(!h.registry.is_gvk_addressable(&widgets("v1").gvk()));
        assert_eq!(h.spawner.count(), 0);
    }

    #[tokio::test]
    async fn test_marker_must_be_exactly_true() {
        let h = harness(vec![crd(
            json!({"labels": {"duck.knative.dev/addressable": "True"}}),
            "Namespaced",
            json!([{"name": "v1", "served": true, "storage": true}]),
        )]);

        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::NotAddressable);
        assert_eq!(h.spawner.count(), 0);
    }

    fn cluster_widgets_crd() -> CustomResourceDefinition {
        crd(
            json!({}),
            "Cluster",
            json!([{"name": "v1", "served": true, "storage": true}]),
        )
    }

    #[tokio::test]
    async fn test_cluster_scoped_crd_registers_kinds_without_loop() {
        let h = harness(vec![cluster_widgets_crd()]);

        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(
            outcome,
            LifecycleOutcome::Ignored(IgnoreReason::ClusterScoped)
        );
        assert_eq!(h.spawner.count(), 0);
        assert!(h.registry.running_keys().is_empty());
        assert!(h.registry.is_gvk_addressable(&widgets("v1").gvk()));

        let again = h.manager.reconcile("widgets.example.io").await.unwrap();
        assert_eq!(again, LifecycleOutcome::Ignored(IgnoreReason::ClusterScoped));
    }

    #[tokio::test]
    async fn test_deleting_cluster_scoped_crd_unregisters_kinds() {
        let h = harness(vec![cluster_widgets_crd()]);
        h.manager.reconcile("widgets.example.io").await.unwrap();

        h.cache.insert(deleting(cluster_widgets_crd()));
        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Unregistered);
        assert!(!h.registry.is_gvk_addressable(&widgets("v1").gvk()));
    }

    #[tokio::test]
    async fn test_deleting_crd_keeps_kind_of_static_loop() {
        let h = harness(vec![widgets_crd()]);
        assert!(start_static_loop(&h.registry, h.spawner.as_ref(), &h.root, widgets("v1")));
        h.manager.reconcile("widgets.example.io").await.unwrap();

        h.cache.insert(deleting(widgets_crd()));
        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Stopped);
        assert!(h.registry.is_gvk_addressable(&widgets("v1").gvk()));
        assert_eq!(
            h.registry.running_keys(),
            vec!["static:widgets.example.io/v1".to_string()]
        );
        assert!(!h.spawner.token(0).is_cancelled());
        assert!(h.spawner.token(1).is_cancelled());
    }

    #[tokio::test]
    async fn test_deleting_unknown_crd_is_ignored() {
        let h = harness(vec![deleting(widgets_crd())]);

        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Ignored(IgnoreReason::NotRunning));
        assert_eq!(h.spawner.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_crd_tears_down_stale_loop() {
        let h = harness(vec![widgets_crd()]);
        h.manager.reconcile("widgets.example.io").await.unwrap();

        let missing = harness(Vec::new());
        let outcome = missing.manager.reconcile("widgets.example.io").await.unwrap();
        assert_eq!(outcome, LifecycleOutcome::Ignored(IgnoreReason::NotFound));

        let manager = AddressableCrdReconciler::new(
            Arc::new(FakeCache::<CustomResourceDefinition>::default()),
            h.registry.clone(),
            h.spawner.clone(),
            h.root.clone(),
        );
        let outcome = manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Stopped);
        assert!(h.spawner.token(0).is_cancelled());
    }

    #[tokio::test]
    async fn test_cache_error_is_retriable() {
        let h = harness(vec![widgets_crd()]);
        h.cache.fail_with(503);

        let err = h.manager.reconcile("widgets.example.io").await.unwrap_err();

        assert!(err.is_retriable());
        assert_eq!(h.spawner.count(), 0);
    }

    #[tokio::test]
    async fn test_recreated_crd_starts_fresh_loop() {
        let h = harness(vec![widgets_crd()]);
        h.manager.reconcile("widgets.example.io").await.unwrap();
        h.cache.insert(deleting(widgets_crd()));
        h.manager.reconcile("widgets.example.io").await.unwrap();

        h.cache.insert(widgets_crd());
        let outcome = h.manager.reconcile("widgets.example.io").await.unwrap();

        assert_eq!(outcome, LifecycleOutcome::Started(widgets("v1")));
        assert_eq!(h.spawner.count(), 2);
        assert!(h.spawner.token(0).is_cancelled());
        assert!(!h.spawner.token(1).is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_start_at_most_one_loop() {
        let h = harness(vec![widgets_crd()]);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = h.manager.clone();
                tokio::spawn(async move { manager.reconcile("widgets.example.io").await })
            })
            .collect();
        let mut started = 0;
        for task in tasks {
            if matches!(task.await.unwrap().unwrap(), LifecycleOutcome::Started(_)) {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(h.spawner.count(), 1);
        assert_eq!(h.registry.running_keys(), vec!["widgets.example.io".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_add_and_delete_keep_one_live_loop() {
        let h = harness(vec![widgets_crd()]);

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let cache = h.cache.clone();
                let manager = h.manager.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        cache.insert(widgets_crd());
                    } else {
                        cache.insert(deleting(widgets_crd()));
                    }
                    manager.reconcile("widgets.example.io").await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let running = h.registry.running_keys();
        assert!(running.len() <= 1);
        let live = h.spawner.tokens().iter().filter(|token| !token.is_cancelled()).count();
        assert_eq!(live, running.len());
        assert_eq!(
            h.registry.is_gvk_addressable(&widgets("v1").gvk()),
            !running.is_empty()
        );
    }

    #[tokio::test]
    async fn test_cancelling_root_stops_every_loop() {
        let h = harness(vec![widgets_crd()]);
        h.manager.reconcile("widgets.example.io").await.unwrap();
        assert!(start_static_loop(
            &h.registry,
            h.spawner.as_ref(),
            &h.root,
            TypeCoordinates {
                group: "serving.knative.dev".to_string(),
                version: "v1".to_string(),
                kind: "Service".to_string(),
                plural: "services".to_string(),
            },
        ));

        h.root.cancel();

        assert!(h.spawner.token(0).is_cancelled());
        assert!(h.spawner.token(1).is_cancelled());
    }

    #[tokio::test]
    async fn test_static_loop_starts_once() {
        let h = harness(Vec::new());
        let services = TypeCoordinates {
            group: "serving.knative.dev".to_string(),
            version: "v1".to_string(),
            kind: "Service".to_string(),
            plural: "services".to_string(),
        };

        assert!(start_static_loop(&h.registry, h.spawner.as_ref(), &h.root, services.clone()));
        assert!(!start_static_loop(&h.registry, h.spawner.as_ref(), &h.root, services.clone()));

        assert_eq!(h.registry.running_keys(), vec!["static:services.serving.knative.dev/v1".to_string()]);
        assert!(h.registry.is_gvk_addressable(&services.gvk()));
        assert_eq!(h.spawner.count(), 1);
    }
}
