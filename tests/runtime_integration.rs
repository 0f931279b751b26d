//! Runtime integration tests: processes wired by hand to a broker, run
//! through their real entry points.

use autonomous_trust_core::config::IdentityConfig;
use autonomous_trust_core::messaging::{
    Capability, Envelope, NetMessage, Payload, QueueBroker, QueueKey, QueueSet, Task,
    TypeSelector, SUPERVISOR_QUEUE,
};
use autonomous_trust_core::process::{LocalCapability, ProcessChannels, RunningProcess};
use autonomous_trust_core::registry::ProcessRegistry;
use autonomous_trust_core::structures::{AssociativeMap, TaggedValue};
use autonomous_trust_core::subsystems::{identity, network};
use autonomous_trust_core::types::{Category, ImplementationId};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

const CADENCE: Duration = Duration::from_millis(25);

struct Node {
    broker: QueueBroker,
    configs: Arc<AssociativeMap>,
    registry: Arc<ProcessRegistry>,
}

fn key(name: &str) -> QueueKey {
    QueueKey::derive(Path::new("/node/etc/at"), name, Some(7))
}

impl Node {
    fn new(configs: AssociativeMap) -> Self {
        let mut registry = ProcessRegistry::new();
        registry.register("identity", identity::IMPLEMENTATION).unwrap();
        registry.register("network", network::IMPLEMENTATION).unwrap();
        Self {
            broker: QueueBroker::default(),
            configs: Arc::new(configs),
            registry: Arc::new(registry),
        }
    }

    fn process(&self, category: &str, implementation: &str) -> RunningProcess {
        let mut queues = QueueSet::new();
        for name in ["identity", "network", SUPERVISOR_QUEUE] {
            queues.insert(self.broker.open(&key(name)).unwrap()).unwrap();
        }
        let channels = ProcessChannels {
            data: self.broker.open(&key(category)).unwrap(),
            signal: self.broker.open(&key(&format!("{category}.signal"))).unwrap(),
            queues,
        };
        RunningProcess::new(
            Category::from_string(category.to_string()).unwrap(),
            ImplementationId::from_string(implementation.to_string()).unwrap(),
            Arc::clone(&self.configs),
            Arc::clone(&self.registry),
            channels,
            CADENCE,
        )
    }

    fn send(&self, queue: &str, envelope: Envelope) {
        self.broker.open(&key(queue)).unwrap().send(envelope).unwrap();
    }

    fn quit_later(&self, category: &str, after: Duration) {
        let signal = self.broker.open(&key(&format!("{category}.signal"))).unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            signal.send(Envelope::quit()).unwrap();
        });
    }
}

fn task(capability: Capability) -> Envelope {
    Envelope::task(Task {
        capability,
        when: chrono::Utc::now(),
        duration: Duration::from_secs(1),
        timeout: Duration::from_secs(1),
    })
}

#[tokio::test(start_paused = true)]
async fn test_loop_takes_one_message_per_tick() {
    let node = Node::new(AssociativeMap::new());
    let mut process = node.process("network", "counting");
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    process
        .register_handler("count", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    for _ in 0..5 {
        node.send(
            "network",
            Envelope::net_message(NetMessage::new("network", "count", vec![])),
        );
    }
    // Lands between the third and fourth tick.
    node.quit_later("network", Duration::from_millis(87));

    let start = Instant::now();
    let summary = process.run().await.unwrap();

    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.handled, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), CADENCE * 4);
    // The fifth message is still queued.
    assert_eq!(node.broker.open(&key("network")).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identity_announcement_reaches_supervisor_via_network() {
    let mut configs = AssociativeMap::new();
    configs
        .set(
            "identity",
            &TaggedValue::object(IdentityConfig {
                uuid: "node-9".to_string(),
                address: "10.9.0.9".to_string(),
                fullname: String::new(),
                nickname: String::new(),
            }),
        )
        .unwrap();
    let node = Node::new(configs);

    let identity_task = tokio::spawn(identity::entry(
        node.process("identity", identity::IMPLEMENTATION),
    ));
    let network_task = tokio::spawn(network::entry(
        node.process("network", network::IMPLEMENTATION),
    ));

    tokio::time::sleep(CADENCE * 3).await;
    let supervisor = node.broker.open(&key(SUPERVISOR_QUEUE)).unwrap();
    let update = supervisor
        .try_recv(TypeSelector::Any)
        .unwrap()
        .expect("peers update");
    match update.payload() {
        Payload::Peers(peers) => {
            assert_eq!(peers.peers.len(), 1);
            assert_eq!(peers.peers[0].uuid, "node-9");
            assert_eq!(peers.peers[0].address, "10.9.0.9");
        }
        other => panic!("unexpected payload: {:?}", other),
    }

    node.quit_later("identity", Duration::ZERO);
    node.quit_later("network", Duration::ZERO);
    let identity_summary = identity_task.await.unwrap().unwrap();
    let network_summary = network_task.await.unwrap().unwrap();
    assert_eq!(identity_summary.handled, 0);
    assert_eq!(network_summary.handled, 1);
    assert!(network_summary.unprocessed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_misaddressed_and_unknown_messages_are_returned() {
    let node = Node::new(AssociativeMap::new());
    let process = node.process("network", network::IMPLEMENTATION);

    node.send(
        "network",
        Envelope::net_message(NetMessage::new("negotiation", "announce", vec![])),
    );
    node.send("network", task(Capability::named("survey")));
    node.quit_later("network", CADENCE * 3);

    let summary = network::entry(process).await.unwrap();
    assert_eq!(summary.handled, 0);
    assert_eq!(summary.unprocessed.len(), 2);
    assert_eq!(summary.unprocessed[1].target_function(), Some("survey"));
}

#[tokio::test]
async fn test_local_capability_runs_detached() {
    let node = Node::new(AssociativeMap::new());
    let mut process = node.process("identity", "worker");

    let (tx, rx) = oneshot::channel::<Vec<String>>();
    let tx = Mutex::new(Some(tx));
    process
        .register_capability(LocalCapability::new("survey", move |args| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(args.to_vec());
            }
        }))
        .unwrap();

    node.send(
        "identity",
        task(Capability {
            name: "survey".to_string(),
            args: vec!["--radius".to_string(), "5km".to_string()],
        }),
    );
    process.poll_once().unwrap();

    let args = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("capability ran")
        .unwrap();
    assert_eq!(args, vec!["--radius".to_string(), "5km".to_string()]);
    assert!(process.unprocessed().is_empty());
}
