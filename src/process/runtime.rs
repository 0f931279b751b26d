//! Per-subsystem receive/dispatch loop.
//!
//! Each tick:
//! 1. sleep out the rest of the cadence,
//! 2. take at most one message from the process's own queue and dispatch it,
//! 3. poll the signal queue and stop on `quit`.
//!
//! Dispatch order: protocol-state messages update the cache; anything else
//! goes to the handler registered under its target function; a task with no
//! handler runs detached if the capability is local; the rest is kept as
//! unprocessed.

use super::cadence::Cadence;
use super::state::{ProcessState, ProtocolState};
use super::task::{run_detached, CapabilityTable, LocalCapability};
use crate::messaging::{Channel, Envelope, MessageType, Payload, QueueSet, TypeSelector};
use crate::registry::ProcessRegistry;
use crate::structures::{AssociativeMap, TaggedValue};
use crate::types::{Category, Error, ImplementationId, Result};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

type HandlerFn = dyn Fn(&ProcessContext, &Envelope) -> Result<()> + Send + Sync;

/// Handler stored in a process's handler map.
pub struct MessageHandler(Box<HandlerFn>);

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageHandler")
    }
}

/// Queues a process owns or may address.
#[derive(Debug)]
pub struct ProcessChannels {
    /// Own data queue.
    pub data: Channel,
    /// Own signal queue.
    pub signal: Channel,
    /// Every data queue by name, including the supervisor's.
    pub queues: QueueSet,
}

/// Everything a handler may read, plus the queues it may send on.
#[derive(Debug)]
pub struct ProcessContext {
    category: Category,
    implementation: ImplementationId,
    configs: Arc<AssociativeMap>,
    registry: Arc<ProcessRegistry>,
    channels: ProcessChannels,
    protocol: ProtocolState,
    data_dir: Option<PathBuf>,
}

impl ProcessContext {
    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn implementation(&self) -> &ImplementationId {
        &self.implementation
    }

    pub fn configs(&self) -> &AssociativeMap {
        &self.configs
    }

    /// Typed config document for `category`.
    pub fn config<T: Any + Send + Sync>(&self, category: &str) -> Result<Arc<T>> {
        self.configs.get(category)?.downcast::<T>()
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn protocol(&self) -> &ProtocolState {
        &self.protocol
    }

    pub fn channels(&self) -> &ProcessChannels {
        &self.channels
    }

    /// Directory for files the subsystem writes. Subsystems share the
    /// process working directory, so paths are resolved against this
    /// instead.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Send to the data queue named `queue`.
    pub fn send_to(&self, queue: &str, envelope: Envelope) -> Result<()> {
        self.channels.queues.fetch(queue)?.send(envelope)
    }
}

/// Counters returned when a process stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub handled: u64,
    pub handler_errors: u64,
    pub state_updates: u64,
    pub tasks_started: u64,
    pub unprocessed: Vec<Envelope>,
}

/// A subsystem wired to its queues and ready to run.
#[derive(Debug)]
pub struct RunningProcess {
    context: ProcessContext,
    handlers: AssociativeMap,
    capabilities: CapabilityTable,
    cadence: Cadence,
    state: ProcessState,
    summary: RunSummary,
}

impl RunningProcess {
    pub fn new(
        category: Category,
        implementation: ImplementationId,
        configs: Arc<AssociativeMap>,
        registry: Arc<ProcessRegistry>,
        channels: ProcessChannels,
        cadence: Duration,
    ) -> Self {
        Self {
            context: ProcessContext {
                category,
                implementation,
                configs,
                registry,
                channels,
                protocol: ProtocolState::default(),
                data_dir: None,
            },
            handlers: AssociativeMap::new(),
            capabilities: CapabilityTable::new(),
            cadence: Cadence::new(cadence),
            state: ProcessState::Running,
            summary: RunSummary::default(),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.context.data_dir = Some(dir.into());
        self
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn unprocessed(&self) -> &[Envelope] {
        &self.summary.unprocessed
    }

    /// Store `handler` under `function`, replacing any previous one.
    pub fn register_handler<F>(&mut self, function: &str, handler: F) -> Result<()>
    where
        F: Fn(&ProcessContext, &Envelope) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.set(
            function,
            &TaggedValue::object(MessageHandler(Box::new(handler))),
        )
    }

    pub fn register_capability(&mut self, capability: LocalCapability) -> Result<()> {
        self.capabilities.register(capability)
    }

    fn handler(&self, function: &str) -> Option<Arc<MessageHandler>> {
        self.handlers
            .get(function)
            .ok()
            .and_then(|value| value.downcast::<MessageHandler>().ok())
    }

    fn stop(&mut self) {
        if self.state.can_transition_to(ProcessState::Stopping) {
            tracing::info!(
                "process_stopping: category={}, ticks={}",
                self.context.category,
                self.summary.ticks
            );
            self.state = ProcessState::Stopping;
        }
    }

    /// One receive/dispatch/signal-check pass without pacing.
    pub fn poll_once(&mut self) -> Result<()> {
        self.summary.ticks += 1;

        if let Some(envelope) = self.context.channels.data.try_recv(TypeSelector::Any)? {
            self.dispatch(envelope);
        }

        if let Some(signal) = self
            .context
            .channels
            .signal
            .try_recv(TypeSelector::Only(MessageType::Signal))?
        {
            if signal.is_quit() {
                self.stop();
            } else {
                tracing::debug!(
                    "signal_ignored: category={}, signal={:?}",
                    self.context.category,
                    signal.payload()
                );
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, envelope: Envelope) {
        if self.context.protocol.apply(&envelope) {
            self.summary.state_updates += 1;
            return;
        }

        if let Payload::NetMessage(msg) = envelope.payload() {
            if msg.process != self.context.category.as_str() {
                tracing::debug!(
                    "message_misaddressed: category={}, process={}",
                    self.context.category,
                    msg.process
                );
                self.summary.unprocessed.push(envelope);
                return;
            }
        }

        let function = envelope.target_function().map(str::to_owned);
        if let Some(handler) = function.as_deref().and_then(|f| self.handler(f)) {
            match (handler.0)(&self.context, &envelope) {
                Ok(()) => self.summary.handled += 1,
                Err(e) => {
                    self.summary.handler_errors += 1;
                    let code = e.code();
                    tracing::error!(
                        "handler_failed: category={}, function={}, code={}, code_name={}, description={}, error={}",
                        self.context.category,
                        function.as_deref().unwrap_or_default(),
                        code.number(),
                        code.as_str(),
                        code.describe(),
                        e
                    );
                }
            }
            return;
        }

        if let Payload::Task(task) = envelope.payload() {
            if let Some(capability) = self.capabilities.find(&task.capability.name) {
                run_detached(task.clone(), capability);
                self.summary.tasks_started += 1;
                return;
            }
        }

        tracing::debug!(
            "message_unprocessed: category={}, type={}",
            self.context.category,
            envelope.message_type()
        );
        self.summary.unprocessed.push(envelope);
    }

    /// Run until a `quit` signal arrives.
    pub async fn run(mut self) -> Result<RunSummary> {
        tracing::info!(
            "process_started: category={}, implementation={}, cadence={:?}",
            self.context.category,
            self.context.implementation,
            self.cadence.period()
        );
        while self.state == ProcessState::Running {
            self.cadence.tick().await;
            self.poll_once()?;
        }
        if !self.summary.unprocessed.is_empty() {
            tracing::warn!(
                "process_unprocessed_messages: category={}, count={}",
                self.context.category,
                self.summary.unprocessed.len()
            );
        }
        Ok(self.summary)
    }
}

/// Error for a handler that refuses a message.
pub fn reject(envelope: &Envelope, reason: &str) -> Error {
    Error::invalid_argument(format!("{} message rejected: {}", envelope.message_type(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{Group, NetMessage, QueueBroker, QueueKey, Signal};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    struct Harness {
        broker: QueueBroker,
        process: RunningProcess,
    }

    fn key(name: &str) -> QueueKey {
        QueueKey::derive(Path::new("/rt"), name, Some(9))
    }

    fn harness(category: &str) -> Harness {
        let broker = QueueBroker::default();
        let data = broker.open(&key(category)).unwrap();
        let signal = broker.open(&key(&format!("{category}.signal"))).unwrap();
        let mut queues = QueueSet::new();
        queues.insert(data.clone()).unwrap();
        queues.insert(broker.open(&key("supervisor")).unwrap()).unwrap();
        let process = RunningProcess::new(
            Category::from_string(category.to_string()).unwrap(),
            ImplementationId::from_string("test_impl".to_string()).unwrap(),
            Arc::new(AssociativeMap::new()),
            Arc::new(ProcessRegistry::new()),
            ProcessChannels {
                data,
                signal,
                queues,
            },
            Duration::from_millis(10),
        );
        Harness { broker, process }
    }

    impl Harness {
        fn send(&self, name: &str, envelope: Envelope) {
            self.broker.open(&key(name)).unwrap().send(envelope).unwrap();
        }
    }

    #[test]
    fn test_handler_invoked_by_function_name() {
        let mut h = harness("network");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        h.process
            .register_handler("announce", move |ctx, env| {
                assert_eq!(ctx.category().as_str(), "network");
                assert_eq!(env.target_function(), Some("announce"));
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        h.send("network", Envelope::net_message(NetMessage::new("network", "announce", vec![])));
        h.process.poll_once().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.process.unprocessed().is_empty());
    }

    #[test]
    fn test_data_dir_is_optional() {
        let h = harness("identity");
        assert_eq!(h.process.context().data_dir(), None);
        let process = h.process.with_data_dir("/node/var/at");
        assert_eq!(process.context().data_dir(), Some(Path::new("/node/var/at")));
    }

    #[test]
    fn test_unknown_function_is_unprocessed() {
        let mut h = harness("network");
        h.send("network", Envelope::net_message(NetMessage::new("network", "nobody", vec![])));
        h.send("network", Envelope::net_message(NetMessage::new("identity", "announce", vec![])));
        h.process.poll_once().unwrap();
        h.process.poll_once().unwrap();
        assert_eq!(h.process.unprocessed().len(), 2);
    }

    #[test]
    fn test_protocol_messages_update_cache() {
        let mut h = harness("identity");
        h.send(
            "identity",
            Envelope::new(Payload::Group(Group {
                uuid: "g".into(),
                address: "239.0.0.1".into(),
            })),
        );
        h.process.poll_once().unwrap();
        assert_eq!(h.process.context().protocol().group.as_ref().unwrap().uuid, "g");
        assert!(h.process.unprocessed().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_handler_error_is_counted_not_fatal() {
        let mut h = harness("network");
        h.process
            .register_handler("announce", |_, env| Err(reject(env, "bad payload")))
            .unwrap();
        h.send("network", Envelope::net_message(NetMessage::new("network", "announce", vec![])));
        h.process.poll_once().unwrap();
        assert_eq!(h.process.state(), ProcessState::Running);
        assert_eq!(h.process.summary.handler_errors, 1);
        assert!(logs_contain("handler_failed"));
        assert!(logs_contain("code=22, code_name=INVALID_ARGUMENT, description=Invalid argument"));
    }

    #[test]
    fn test_quit_signal_stops() {
        let mut h = harness("identity");
        h.send("identity.signal", Envelope::signal(Signal::new("hup", 1).unwrap()));
        h.process.poll_once().unwrap();
        assert_eq!(h.process.state(), ProcessState::Running);

        h.send("identity.signal", Envelope::quit());
        h.process.poll_once().unwrap();
        assert_eq!(h.process.state(), ProcessState::Stopping);
    }

    #[test]
    fn test_handlers_can_send_to_other_queues() {
        let mut h = harness("identity");
        h.process
            .register_handler("forward", |ctx, _| {
                ctx.send_to("supervisor", Envelope::signal(Signal::new("done", 0)?))
            })
            .unwrap();
        h.send("identity", Envelope::net_message(NetMessage::new("identity", "forward", vec![])));
        h.process.poll_once().unwrap();
        let out = h.broker.open(&key("supervisor")).unwrap();
        assert!(out.try_recv(TypeSelector::Any).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paces_ticks() {
        let h = harness("identity");
        let signal = h.broker.open(&key("identity.signal")).unwrap();
        let start = tokio::time::Instant::now();
        let task = tokio::spawn(h.process.run());

        // Quit lands between tick 4 and tick 5.
        tokio::time::sleep(Duration::from_millis(45)).await;
        signal.send(Envelope::quit()).unwrap();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.ticks, 5);
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }
}
