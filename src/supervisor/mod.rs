//! Subsystem supervisor.
//!
//! The supervisor loads the process registry and config documents, wires one
//! data queue and one signal queue per category, detaches every subsystem
//! into its own task and then alternates between monitoring those tasks and
//! draining its own queues until none are left.
//!
//! Shutdown is cooperative: when the cancellation token fires (or every
//! subsystem has exited) a `quit` signal is broadcast to every signal queue.
//! Subsystems still running after the grace period are aborted.
//!
//! There is no restart policy. A subsystem that exits, for any reason, is
//! logged and stays down.

mod state;

pub use state::{ChildExit, SupervisorState};

use crate::config::ConfigRegistry;
use crate::messaging::{
    signal_queue_name, BrokerStats, Channel, Envelope, QueueBroker, QueueKey, QueueSet,
    TypeSelector, EXTERN_IN_QUEUE, EXTERN_OUT_QUEUE, SUPERVISOR_QUEUE,
};
use crate::process::{Cadence, ProcessChannels, ProtocolState, RunSummary, RunningProcess};
use crate::registry::{ImplementationTable, ProcessRegistry, REGISTRY_FILENAME};
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::{Category, Config, Error, ImplementationId, Result, RunId};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Decides whether an unhandled supervisor message is forwarded to
/// `extern_out`.
pub type ForwardPolicy = Box<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Default policy: forward nothing.
pub fn forward_nothing() -> ForwardPolicy {
    Box::new(|_| false)
}

// =============================================================================
// Report
// =============================================================================

/// Final record for one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub category: String,
    pub implementation: String,
    pub task_id: String,
    pub exit: ChildExit,
}

/// What a supervisor run did.
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub run_id: RunId,
    pub exit_code: i32,
    pub spawned: usize,
    pub errors: usize,
    pub missing_configs: usize,
    pub children: Vec<ChildRecord>,
    /// Messages taken from `extern_in`, awaiting a routing policy.
    pub pending_tasks: Vec<Envelope>,
    /// Messages on the supervisor's queue nothing handled or forwarded.
    pub unhandled: Vec<Envelope>,
    pub forwarded: usize,
    pub protocol: ProtocolState,
    pub broker: BrokerStats,
}

impl SupervisorReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            exit_code: 0,
            spawned: 0,
            errors: 0,
            missing_configs: 0,
            children: Vec::new(),
            pending_tasks: Vec::new(),
            unhandled: Vec::new(),
            forwarded: 0,
            protocol: ProtocolState::default(),
            broker: BrokerStats::default(),
        }
    }

    pub fn exit_of(&self, category: &str) -> Option<&ChildExit> {
        self.children
            .iter()
            .find(|c| c.category == category)
            .map(|c| &c.exit)
    }
}

// =============================================================================
// Internal bookkeeping
// =============================================================================

struct Child {
    category: String,
    implementation: String,
    task_id: String,
    handle: JoinHandle<Result<RunSummary>>,
    exit: Option<ChildExit>,
}

struct Bootstrap {
    registry: ProcessRegistry,
    /// Copy handed to every subsystem.
    shared: ProcessRegistry,
    configs: AssociativeMap,
}

struct Wiring {
    data: QueueSet,
    signals: Vec<(String, Channel)>,
    own: Channel,
    extern_in: Channel,
    extern_out: Channel,
}

fn classify(result: std::result::Result<Result<RunSummary>, JoinError>) -> ChildExit {
    match result {
        Ok(Ok(_)) => ChildExit::Normal,
        Ok(Err(e)) => ChildExit::Failed(e.to_string()),
        Err(e) if e.is_panic() => ChildExit::Panicked,
        Err(_) => ChildExit::Cancelled,
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Runs one node's subsystems.
pub struct Supervisor {
    run_id: RunId,
    config: Config,
    converters: ConfigRegistry,
    implementations: ImplementationTable,
    registry_override: Option<ProcessRegistry>,
    forward_policy: ForwardPolicy,
    broker: Arc<QueueBroker>,
    queue_id: u32,
    state: SupervisorState,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("queue_id", &self.queue_id)
            .field("implementations", &self.implementations)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(config: Config, implementations: ImplementationTable) -> Self {
        let queue_id = config
            .messaging
            .queue_id
            .unwrap_or_else(crate::messaging::random_queue_id);
        let broker = Arc::new(QueueBroker::new(config.messaging.queue_capacity));
        Self {
            run_id: RunId::new(),
            config,
            converters: ConfigRegistry::builtin(),
            implementations,
            registry_override: None,
            forward_policy: forward_nothing(),
            broker,
            queue_id,
            state: SupervisorState::Bootstrapping,
        }
    }

    /// Replace the config converter table.
    pub fn with_converters(mut self, converters: ConfigRegistry) -> Self {
        self.converters = converters;
        self
    }

    /// Use `registry` instead of reading `subsystems.cfg.json`.
    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry_override = Some(registry);
        self
    }

    pub fn with_forward_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        self.forward_policy = Box::new(policy);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Broker carrying every queue this supervisor opens.
    pub fn broker(&self) -> Arc<QueueBroker> {
        Arc::clone(&self.broker)
    }

    /// Key of the queue called `name` in this run.
    pub fn queue_key(&self, name: &str) -> QueueKey {
        QueueKey::derive(&self.config.paths.config_dir(), name, Some(self.queue_id))
    }

    /// Key of `category`'s signal queue in this run.
    pub fn signal_key(&self, category: &str) -> QueueKey {
        self.queue_key(&signal_queue_name(
            category,
            &self.config.messaging.signal_suffix,
        ))
    }

    fn transition(&mut self, to: SupervisorState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::internal(format!(
                "invalid supervisor transition {} -> {}",
                self.state, to
            )));
        }
        tracing::debug!("supervisor_state: from={}, to={}", self.state, to);
        self.state = to;
        Ok(())
    }

    // =========================================================================
    // Bootstrapping
    // =========================================================================

    /// Read the registry document, or `None` when it cannot be used.
    ///
    /// A missing or malformed document is logged and counted; the run goes
    /// on with no subsystems.
    fn load_registry(&mut self, report: &mut SupervisorReport) -> Option<ProcessRegistry> {
        if let Some(registry) = self.registry_override.take() {
            return Some(registry);
        }
        let path = self.config.paths.config_dir().join(REGISTRY_FILENAME);
        match ProcessRegistry::from_file(&path) {
            Ok(scan) => {
                report.errors += scan.failures.len();
                Some(scan.registry)
            }
            Err(e) => {
                report.errors += 1;
                let code = e.code();
                tracing::error!(
                    "registry_load_failed: path={}, code={}, code_name={}, description={}, error={}",
                    path.display(),
                    code.number(),
                    code.as_str(),
                    code.describe(),
                    e
                );
                None
            }
        }
    }

    fn bootstrap(&mut self, report: &mut SupervisorReport) -> Result<Bootstrap> {
        let cfg_dir = self.config.paths.config_dir();
        let loaded = self.load_registry(report);

        let mut scan = self.converters.load_directory(&cfg_dir, REGISTRY_FILENAME)?;
        report.errors += scan.failures.len();
        if let Some(registry) = &loaded {
            scan.configs
                .set("subsystems", &TaggedValue::object(registry.to_document()))?;
        }
        let registry = loaded.unwrap_or_default();
        let shared = registry.snapshot()?;

        let missing: Vec<&str> = self
            .config
            .supervisor
            .required
            .iter()
            .map(String::as_str)
            .filter(|name| !scan.configs.contains_key(name))
            .collect();
        report.missing_configs = missing.len();
        if !missing.is_empty() {
            tracing::warn!(
                "configs_missing: count={}, categories={:?}",
                missing.len(),
                missing
            );
        }

        tracing::info!(
            "bootstrap_complete: subsystems={}, configs={}",
            registry.len(),
            scan.configs.len()
        );
        Ok(Bootstrap {
            registry,
            shared,
            configs: scan.configs,
        })
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    fn wire(&self, registry: &ProcessRegistry) -> Result<Wiring> {
        let mut data = QueueSet::new();
        let names = registry
            .categories()
            .chain([SUPERVISOR_QUEUE, EXTERN_IN_QUEUE, EXTERN_OUT_QUEUE]);
        for name in names {
            data.insert(self.broker.open(&self.queue_key(name))?)?;
        }

        let mut signals = Vec::with_capacity(registry.len());
        for category in registry.categories() {
            let channel = self.broker.open(&self.signal_key(category))?;
            signals.push((category.to_string(), channel));
        }

        Ok(Wiring {
            own: data.fetch(SUPERVISOR_QUEUE)?,
            extern_in: data.fetch(EXTERN_IN_QUEUE)?,
            extern_out: data.fetch(EXTERN_OUT_QUEUE)?,
            data,
            signals,
        })
    }

    fn process_channels(&self, wiring: &Wiring, category: &str) -> Result<ProcessChannels> {
        let mut queues = QueueSet::new();
        for channel in wiring.data.channels() {
            queues.insert(channel)?;
        }
        let signal = wiring
            .signals
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, channel)| channel.clone())
            .ok_or_else(|| Error::not_found(format!("signal queue for '{}'", category)))?;
        Ok(ProcessChannels {
            data: wiring.data.fetch(category)?,
            signal,
            queues,
        })
    }

    fn spawn_one(
        &self,
        category: &str,
        implementation: &str,
        wiring: &Wiring,
        configs: &Arc<AssociativeMap>,
        registry: &Arc<ProcessRegistry>,
    ) -> Result<Child> {
        let entry = self.implementations.find_implementation(implementation)?;
        let process = RunningProcess::new(
            Category::from_string(category.to_string()).map_err(Error::invalid_argument)?,
            ImplementationId::from_string(implementation.to_string())
                .map_err(Error::invalid_argument)?,
            Arc::clone(configs),
            Arc::clone(registry),
            self.process_channels(wiring, category)?,
            self.config.runtime.cadence,
        )
        .with_data_dir(self.config.paths.data_dir());
        let handle = tokio::spawn(entry(process));
        let task_id = handle.id().to_string();
        tracing::info!(
            "subsystem_spawned: category={}, implementation={}, task_id={}",
            category,
            implementation,
            task_id
        );
        Ok(Child {
            category: category.to_string(),
            implementation: implementation.to_string(),
            task_id,
            handle,
            exit: None,
        })
    }

    fn spawn_all(
        &self,
        bootstrap: Bootstrap,
        wiring: &Wiring,
        report: &mut SupervisorReport,
    ) -> Vec<Child> {
        let configs = Arc::new(bootstrap.configs);
        let registry = Arc::new(bootstrap.shared);
        let mut children = Vec::with_capacity(registry.len());

        for (category, implementation) in bootstrap.registry.entries() {
            match self.spawn_one(category, implementation, wiring, &configs, &registry) {
                Ok(child) => children.push(child),
                Err(e) => {
                    report.errors += 1;
                    let code = e.code();
                    tracing::error!(
                        "subsystem_spawn_failed: category={}, implementation={}, code={}, code_name={}, description={}, error={}",
                        category,
                        implementation,
                        code.number(),
                        code.as_str(),
                        code.describe(),
                        e
                    );
                }
            }
        }
        report.spawned = children.len();
        children
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    fn record_exit(child: &mut Child, exit: ChildExit, report: &mut SupervisorReport) {
        match &exit {
            ChildExit::Normal => tracing::info!(
                "subsystem_exited: category={}, task_id={}",
                child.category,
                child.task_id
            ),
            ChildExit::Cancelled => tracing::warn!(
                "subsystem_cancelled: category={}, task_id={}",
                child.category,
                child.task_id
            ),
            ChildExit::Failed(_) | ChildExit::Panicked => {
                report.errors += 1;
                tracing::error!(
                    "subsystem_failed: category={}, task_id={}, exit={}",
                    child.category,
                    child.task_id,
                    exit
                );
            }
        }
        child.exit = Some(exit);
    }

    /// Collect finished children without blocking. Returns the active count.
    fn monitor(children: &mut [Child], report: &mut SupervisorReport) -> usize {
        for child in children.iter_mut().filter(|c| c.exit.is_none()) {
            if !child.handle.is_finished() {
                continue;
            }
            if let Some(result) = (&mut child.handle).now_or_never() {
                Self::record_exit(child, classify(result), report);
            }
        }
        children.iter().filter(|c| c.exit.is_none()).count()
    }

    async fn abort_remaining(children: &mut [Child], report: &mut SupervisorReport) {
        for child in children.iter_mut().filter(|c| c.exit.is_none()) {
            child.handle.abort();
            let result = (&mut child.handle).await;
            Self::record_exit(child, classify(result), report);
        }
    }

    // =========================================================================
    // Draining
    // =========================================================================

    fn drain(&self, wiring: &Wiring, report: &mut SupervisorReport) {
        match wiring.extern_in.try_recv(TypeSelector::Any) {
            Ok(Some(envelope)) => {
                tracing::debug!("extern_task_buffered: type={}", envelope.message_type());
                report.pending_tasks.push(envelope);
            }
            Ok(None) => {}
            Err(e) => {
                report.errors += 1;
                tracing::error!("extern_receive_failed: {}", e);
            }
        }

        match wiring.own.try_recv(TypeSelector::Any) {
            Ok(Some(envelope)) => {
                if !report.protocol.apply(&envelope) {
                    tracing::debug!("result_unhandled: type={}", envelope.message_type());
                    report.unhandled.push(envelope);
                }
            }
            Ok(None) => {}
            Err(e) => {
                report.errors += 1;
                tracing::error!("result_receive_failed: {}", e);
            }
        }

        let mut kept = Vec::with_capacity(report.unhandled.len());
        for envelope in std::mem::take(&mut report.unhandled) {
            if !(self.forward_policy)(&envelope) {
                kept.push(envelope);
                continue;
            }
            match wiring.extern_out.send(envelope.clone()) {
                Ok(()) => report.forwarded += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("extern_forward_failed: {}", e);
                    kept.push(envelope);
                }
            }
        }
        report.unhandled = kept;
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    fn broadcast_quit(&mut self, wiring: &Wiring, report: &mut SupervisorReport) -> Result<()> {
        self.transition(SupervisorState::ShuttingDown)?;
        let mut delivered = 0;
        for (category, channel) in &wiring.signals {
            match channel.send(Envelope::quit()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("quit_send_failed: category={}, error={}", category, e);
                }
            }
        }
        tracing::info!(
            "shutdown_broadcast: delivered={}, queues={}",
            delivered,
            wiring.signals.len()
        );
        Ok(())
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Run every registered subsystem until all have exited.
    ///
    /// Only a failure to build the registry or the config map is returned as
    /// an error. A missing registry document, bad config files and
    /// per-subsystem failures are logged and counted in the report.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SupervisorReport> {
        let mut report = SupervisorReport::new(self.run_id.clone());
        tracing::info!(
            "supervisor_starting: run_id={}, root={}",
            self.run_id,
            self.config.paths.root().display()
        );

        let bootstrap = match self.bootstrap(&mut report) {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                let code = e.code();
                tracing::error!(
                    "bootstrap_failed: code={}, code_name={}, description={}, error={}",
                    code.number(),
                    code.as_str(),
                    code.describe(),
                    e
                );
                self.transition(SupervisorState::Terminated)?;
                return Err(e);
            }
        };

        self.transition(SupervisorState::Spawning)?;
        let wiring = self.wire(&bootstrap.registry)?;
        let mut children = self.spawn_all(bootstrap, &wiring, &mut report);
        self.transition(SupervisorState::Monitoring)?;

        let grace = self.config.supervisor.shutdown_grace;
        let mut cadence = Cadence::new(self.config.supervisor.cadence);
        let mut grace_deadline: Option<Instant> = None;

        loop {
            let active = Self::monitor(&mut children, &mut report);
            if active == 0 {
                break;
            }

            match grace_deadline {
                None if shutdown.is_cancelled() => {
                    self.broadcast_quit(&wiring, &mut report)?;
                    grace_deadline = Some(Instant::now() + grace);
                }
                None => {
                    self.transition(SupervisorState::Draining)?;
                    self.drain(&wiring, &mut report);
                    self.transition(SupervisorState::Monitoring)?;
                }
                Some(deadline) if Instant::now() >= deadline => {
                    tracing::warn!("shutdown_grace_elapsed: active={}", active);
                    Self::abort_remaining(&mut children, &mut report).await;
                    break;
                }
                Some(_) => {}
            }

            tokio::select! {
                _ = cadence.tick() => {}
                _ = shutdown.cancelled(), if grace_deadline.is_none() => {}
            }
        }

        if grace_deadline.is_none() {
            self.broadcast_quit(&wiring, &mut report)?;
        }

        self.transition(SupervisorState::Terminated)?;
        report.broker = self.broker.stats();
        let closed = self.broker.close_all()?;
        report.children = children
            .into_iter()
            .map(|child| ChildRecord {
                category: child.category,
                implementation: child.implementation,
                task_id: child.task_id,
                exit: child.exit.unwrap_or(ChildExit::Cancelled),
            })
            .collect();

        tracing::info!(
            "supervisor_terminated: run_id={}, exit_code={}, errors={}, queues_closed={}",
            self.run_id,
            report.exit_code,
            report.errors,
            closed
        );
        Ok(report)
    }
}
