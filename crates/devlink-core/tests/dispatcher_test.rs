#![allow(clippy::unwrap_used)]

//! Dispatcher driving the reconciler from the store's watch.

use std::sync::Arc;
use std::time::Duration;

use devlink_core::bridge::ConnectionManager;
use devlink_core::{
    ConditionStatus, ConditionType, DeviceAdaptor, DeviceLink, DeviceLinkReconciler,
    DeviceLinkSpec, Dispatcher, LimbMetrics, LinkAdmitter, MemoryBridge, MemoryRecorder,
    MemoryStore, ObjectKey, ReconcilerConfig, ResourceStore, TypeMeta,
};
use tokio_util::sync::CancellationToken;

const NODE: &str = "edge-1";

fn model() -> TypeMeta {
    TypeMeta::new("devices.edge.cattle.io/v1alpha1", "DummyDevice")
}

fn link(name: &str, adaptor: &str) -> DeviceLink {
    DeviceLink::new(
        &ObjectKey::new("default", name),
        DeviceLinkSpec {
            adaptor: DeviceAdaptor {
                node: NODE.into(),
                name: adaptor.into(),
                parameters: None,
            },
            model: model(),
            ..DeviceLinkSpec::default()
        },
    )
}

struct Running {
    store: Arc<MemoryStore>,
    bridge: Arc<MemoryBridge>,
    admitter: LinkAdmitter,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

async fn start(adaptors: &[&str]) -> Running {
    let store = Arc::new(MemoryStore::new());
    store.register_model(model());
    let bridge = Arc::new(MemoryBridge::with_adaptors(adaptors.iter().copied()));
    let reconciler = Arc::new(DeviceLinkReconciler::new(
        store.clone(),
        bridge.clone(),
        Arc::new(MemoryRecorder::new()),
        Arc::new(LimbMetrics::new()),
        NODE,
    ));
    let config = ReconcilerConfig {
        requeue_base_delay: Duration::from_millis(1),
        requeue_max_delay: Duration::from_millis(20),
        ..ReconcilerConfig::new(NODE)
    };
    let dispatcher = Dispatcher::new(reconciler, store.clone(), config).unwrap();
    bridge.register_adaptor_handler(dispatcher.adaptor_handler());
    bridge.register_connection_handler(dispatcher.connection_handler());

    let cancel = CancellationToken::new();
    let events = store.watch();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(events, cancel).await.unwrap() })
    };
    Running {
        admitter: LinkAdmitter::new(store.clone()),
        store,
        bridge,
        cancel,
        task,
    }
}

async fn wait_for(store: &MemoryStore, key: &ObjectKey, condition: ConditionType, status: ConditionStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(link) = store.get_link(key).await {
                if link.status.condition_status(condition) == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drives_links_to_connected() {
    let running = start(&["adaptor-x"]).await;
    for name in ["fan", "lamp", "heater"] {
        let created = running.store.create_link(link(name, "adaptor-x")).unwrap();
        running.admitter.admit(&created.key()).await.unwrap();
    }

    for name in ["fan", "lamp", "heater"] {
        let key = ObjectKey::new("default", name);
        wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;
    }
    assert_eq!(running.bridge.live_connections(), 3);
    assert_eq!(running.store.list_devices().len(), 3);

    running.cancel.cancel();
    running.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn adaptor_registration_wakes_waiting_links() {
    let running = start(&[]).await;
    let created = running.store.create_link(link("fan", "adaptor-late")).unwrap();
    let key = created.key();
    running.admitter.admit(&key).await.unwrap();
    wait_for(&running.store, &key, ConditionType::AdaptorExisted, ConditionStatus::False).await;

    running.bridge.register_adaptor("adaptor-late").await;
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;

    running.cancel.cancel();
    running.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_then_recovered_connection_reconnects() {
    let running = start(&["adaptor-x"]).await;
    let created = running.store.create_link(link("fan", "adaptor-x")).unwrap();
    let key = created.key();
    running.admitter.admit(&key).await.unwrap();
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;

    running.bridge.break_connection(&key, "socket closed").await;
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::False).await;
    assert!(!running.bridge.is_connected(&key));

    running.bridge.recover_connection(&key).await;
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;
    assert!(running.bridge.is_connected(&key));

    running.cancel.cancel();
    running.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn adaptor_swap_reconnects_after_recovered_push() {
    let running = start(&["adaptor-x", "adaptor-y"]).await;
    let created = running.store.create_link(link("fan", "adaptor-x")).unwrap();
    let key = created.key();
    running.admitter.admit(&key).await.unwrap();
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;

    running
        .store
        .apply_link_spec(&key, link("fan", "adaptor-y").spec)
        .unwrap();
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::False).await;
    assert!(!running.bridge.is_connected(&key));

    running.bridge.recover_connection(&key).await;
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;
    assert_eq!(running.bridge.session_adaptor(&key).as_deref(), Some("adaptor-y"));

    running.cancel.cancel();
    running.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletion_through_the_watch_cleans_up() {
    let running = start(&["adaptor-x"]).await;
    let created = running.store.create_link(link("fan", "adaptor-x")).unwrap();
    let key = created.key();
    running.admitter.admit(&key).await.unwrap();
    wait_for(&running.store, &key, ConditionType::DeviceConnected, ConditionStatus::True).await;

    running.store.delete_link(&key).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while running.store.contains_link(&key) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(running.bridge.live_connections(), 0);
    assert!(running.store.list_devices().is_empty());

    running.cancel.cancel();
    running.task.await.unwrap();
}

#[tokio::test]
async fn rejects_invalid_config() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Arc::new(DeviceLinkReconciler::new(
        store.clone(),
        Arc::new(MemoryBridge::new()),
        Arc::new(MemoryRecorder::new()),
        Arc::new(LimbMetrics::new()),
        "",
    ));
    assert!(Dispatcher::new(reconciler, store, ReconcilerConfig::default()).is_err());
}
