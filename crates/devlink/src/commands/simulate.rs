//! `devlink simulate` -- drive a manifest through admission and reconcile
//! passes against in-memory collaborators.
//!
//! By default passes are stepped one at a time so each can be reported.
//! With `--dispatch` the configured worker pool drives the link instead.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devlink_core::model::Condition;
use devlink_core::{
    ConditionStatus, ConnectionManager, CoreError, DeviceLink, DeviceLinkReconciler,
    DeviceLinkStatus, Dispatcher, DynamicObject, Event, LimbMetrics, LinkAdmitter, MemoryBridge,
    MemoryRecorder, MemoryStore, MetricsSnapshot, ObjectKey, ReconcileOutcome, ReconcilerConfig,
    ResourceStore,
};

use crate::cli::{GlobalOpts, SimulateArgs};
use crate::error::CliError;
use crate::output;

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
enum Phase {
    Reconcile,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
enum Mode {
    Stepped,
    Dispatched,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassReport {
    pass: u32,
    phase: Phase,
    requeue: bool,
    writes: u64,
    conditions: Vec<Condition>,
    events: Vec<Event>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    link: ObjectKey,
    node: String,
    mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    settled: bool,
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<DynamicObject>,
    conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    passes: Vec<PassReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<Event>,
    metrics: MetricsSnapshot,
}

// ── Harness ──────────────────────────────────────────────────────────

/// Consecutive quiet polls before a dispatched link counts as settled.
const QUIET_POLLS: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Simulation {
    store: Arc<MemoryStore>,
    bridge: Arc<MemoryBridge>,
    recorder: Arc<MemoryRecorder>,
    metrics: Arc<LimbMetrics>,
    reconciler: Arc<DeviceLinkReconciler>,
    key: ObjectKey,
    passes: Vec<PassReport>,
}

impl Simulation {
    async fn conditions(&self) -> Vec<Condition> {
        match self.store.get_link(&self.key).await {
            Ok(link) => link.status.conditions.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Run passes until one neither writes nor asks to come back.
    async fn settle(&mut self, phase: Phase, budget: u32) -> bool {
        for _ in 0..budget {
            let before = self.store.write_stats().total();
            let outcome = self.reconciler.reconcile(&self.key).await;
            let writes = self.store.write_stats().total() - before;

            let conditions = self.conditions().await;
            let pass = u32::try_from(self.passes.len()).unwrap_or(u32::MAX).saturating_add(1);
            debug!(pass, ?outcome, writes, "pass finished");
            self.passes.push(PassReport {
                pass,
                phase,
                requeue: outcome.is_requeue(),
                writes,
                conditions,
                events: self.recorder.drain(),
            });

            if outcome == ReconcileOutcome::Done && writes == 0 {
                return true;
            }
        }
        false
    }

    /// Wait until the dispatcher's queue is idle and the store has stopped
    /// changing, or `wait` runs out.
    async fn quiesce(&self, dispatcher: &Dispatcher, wait: Duration) -> bool {
        let quiet = async {
            let mut last = self.store.write_stats();
            let mut calm = 0;
            while calm < QUIET_POLLS {
                tokio::time::sleep(POLL_INTERVAL).await;
                let now = self.store.write_stats();
                if dispatcher.queue().is_idle() && now == last {
                    calm += 1;
                } else {
                    calm = 0;
                }
                last = now;
            }
        };
        tokio::time::timeout(wait, quiet).await.is_ok()
    }

    /// Hand the link to a dispatcher and let its workers settle it.
    async fn dispatch(
        &self,
        runtime: ReconcilerConfig,
        wait: Duration,
        delete: bool,
    ) -> Result<(bool, Option<bool>), CliError> {
        let dispatcher = Dispatcher::new(self.reconciler.clone(), self.store.clone(), runtime)?;
        self.bridge.register_adaptor_handler(dispatcher.adaptor_handler());
        self.bridge
            .register_connection_handler(dispatcher.connection_handler());
        dispatcher.enqueue(self.key.clone());

        let cancel = CancellationToken::new();
        let task = {
            let dispatcher = dispatcher.clone();
            let events = self.store.watch();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(events, cancel).await })
        };

        let mut settled = self.quiesce(&dispatcher, wait).await;
        let mut deleted = None;
        if settled && delete {
            self.store
                .delete_link(&self.key)
                .map_err(CoreError::from)?;
            settled = self.quiesce(&dispatcher, wait).await;
            deleted = Some(!self.store.contains_link(&self.key));
        }

        cancel.cancel();
        task.await.map_err(|_| CoreError::Shutdown)??;
        Ok((settled, deleted))
    }

    async fn report(
        self,
        node: String,
        mode: Mode,
        workers: Option<usize>,
        settled: bool,
        deleted: Option<bool>,
    ) -> SimulationReport {
        let device = self.store.list_devices().into_iter().next();
        let conditions = self.conditions().await;
        SimulationReport {
            connected: self.bridge.is_connected(&self.key),
            link: self.key,
            node,
            mode,
            workers,
            settled,
            deleted,
            device,
            conditions,
            passes: self.passes,
            events: self.recorder.drain(),
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Node precedence: `--node`, then config, then the node the link names.
fn resolve_node(configured: &str, link: &DeviceLink) -> String {
    if configured.is_empty() {
        link.spec.adaptor.node.clone()
    } else {
        configured.to_owned()
    }
}

pub async fn handle(args: &SimulateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = super::load_config(global)?;
    let mut declared = super::load_manifest(&args.manifest)?;
    let node = resolve_node(&config.node_name, &declared);
    if node.is_empty() {
        return Err(CliError::Validation {
            field: "node".into(),
            reason: "no node given and the manifest names none in spec.adaptor.node".into(),
        });
    }
    config.node_name.clone_from(&node);

    let store = Arc::new(MemoryStore::new());
    if !args.no_model {
        store.register_model(declared.spec.model.clone());
    }
    let adaptors = if args.adaptors.is_empty() {
        vec![declared.spec.adaptor.name.clone()]
    } else {
        args.adaptors.clone()
    };
    let bridge = Arc::new(MemoryBridge::with_adaptors(adaptors));
    if args.fail_connect {
        bridge.fail_connects(1);
    }
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(LimbMetrics::new());
    let reconciler = Arc::new(DeviceLinkReconciler::new(
        store.clone(),
        bridge.clone(),
        recorder.clone(),
        metrics.clone(),
        node.clone(),
    ));

    // Start from a freshly declared link: whatever status the manifest
    // carried is the controller's to compute.
    declared.status = DeviceLinkStatus::default();
    declared.metadata.finalizers.clear();
    let key = store
        .create_link(declared)
        .map_err(CoreError::from)?
        .key();
    LinkAdmitter::new(store.clone()).admit(&key).await?;
    info!(link = %key, %node, dispatch = args.dispatch, "simulating");

    let mut sim = Simulation {
        store: store.clone(),
        bridge,
        recorder,
        metrics,
        reconciler,
        key: key.clone(),
        passes: Vec::new(),
    };

    let color = output::should_color(&global.color);
    if args.dispatch {
        let runtime = config.to_reconciler_config()?;
        let workers = runtime.workers;
        let (settled, deleted) = sim
            .dispatch(runtime, Duration::from_millis(args.wait_ms), args.delete)
            .await?;
        let report = sim
            .report(node, Mode::Dispatched, Some(workers), settled, deleted)
            .await;
        let out = output::render_single(&global.output, &report, |r| detail(r, color))?;
        output::print_output(&out, global.quiet);
        return if settled {
            Ok(())
        } else {
            Err(CliError::NotIdle {
                waited_ms: args.wait_ms,
            })
        };
    }

    let mut settled = sim.settle(Phase::Reconcile, args.max_passes).await;
    let mut deleted = None;
    if settled && args.delete {
        store.delete_link(&key).map_err(CoreError::from)?;
        settled = sim.settle(Phase::Delete, args.max_passes).await;
        deleted = Some(!store.contains_link(&key));
    }

    let passes = u32::try_from(sim.passes.len()).unwrap_or(u32::MAX);
    let report = sim.report(node, Mode::Stepped, None, settled, deleted).await;
    let out = output::render_single(&global.output, &report, |r| detail(r, color))?;
    output::print_output(&out, global.quiet);

    if settled {
        Ok(())
    } else {
        Err(CliError::NotSettled { passes })
    }
}

// ── Table view ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ConditionRow {
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Adaptor")]
    adaptor: String,
    #[tabled(rename = "Connections")]
    connections: i64,
    #[tabled(rename = "Sends")]
    sends: u64,
    #[tabled(rename = "Send errors")]
    send_errors: u64,
    #[tabled(rename = "Connect errors")]
    connect_errors: u64,
}

fn condition_rows(conditions: &[Condition], color: bool) -> Vec<ConditionRow> {
    conditions
        .iter()
        .map(|c| ConditionRow {
            condition: c.condition_type.to_string(),
            status: output::paint_status(c.status, color),
            reason: c.reason.clone(),
            message: c.message.clone(),
        })
        .collect()
}

fn detail(report: &SimulationReport, color: bool) -> String {
    let title = match report.workers {
        Some(workers) => format!(
            "Dispatching {} on node {} with {workers} workers",
            report.link, report.node
        ),
        None => format!("Simulating {} on node {}", report.link, report.node),
    };
    let mut lines = vec![output::heading(&title, color)];

    for pass in &report.passes {
        let writes = if pass.writes == 1 { "write" } else { "writes" };
        let outcome = if pass.requeue { "requeue" } else { "done" };
        lines.push(String::new());
        lines.push(format!(
            "Pass {} · {} · {outcome} · {} {writes}",
            pass.pass, pass.phase, pass.writes
        ));
        if pass.conditions.is_empty() {
            lines.push("  (link is gone)".into());
        } else {
            lines.push(output::render_table(&condition_rows(&pass.conditions, color)));
        }
        for event in &pass.events {
            lines.push(format!(
                "  {} {}: {}",
                event.event_type, event.reason, event.message
            ));
        }
    }

    if report.passes.is_empty() {
        lines.push(String::new());
        if report.conditions.is_empty() {
            lines.push("  (link is gone)".into());
        } else {
            lines.push(output::render_table(&condition_rows(&report.conditions, color)));
        }
        for event in &report.events {
            lines.push(format!(
                "  {} {}: {}",
                event.event_type, event.reason, event.message
            ));
        }
    }

    lines.push(String::new());
    let connected = if report.connected {
        output::paint_status(ConditionStatus::True, color)
    } else {
        output::paint_status(ConditionStatus::False, color)
    };
    let mut summary = vec![
        ("Mode", report.mode.to_string()),
        ("Settled", report.settled.to_string()),
        ("Connected", connected),
    ];
    if !report.passes.is_empty() {
        summary.push(("Passes", report.passes.len().to_string()));
    }
    if let Some(deleted) = report.deleted {
        summary.push(("Deleted", deleted.to_string()));
    }
    if let Some(ref device) = report.device {
        summary.push(("Device", format!("{} {}", device.kind(), device.key())));
    }
    lines.push(output::render_fields(&summary));

    if !report.metrics.adaptors.is_empty() {
        let rows: Vec<MetricsRow> = report
            .metrics
            .adaptors
            .iter()
            .map(|(name, m)| MetricsRow {
                adaptor: name.clone(),
                connections: m.connections,
                sends: m.send_latency.count,
                send_errors: m.send_errors,
                connect_errors: m.connect_errors,
            })
            .collect();
        lines.push(output::render_table(&rows));
    }

    lines.join("\n")
}
