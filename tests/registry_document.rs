//! Registry and config documents as they sit on disk.

use autonomous_trust_core::config::{ConfigDocument, ConfigRegistry};
use autonomous_trust_core::registry::{ProcessRegistry, REGISTRY_FILENAME};
use autonomous_trust_core::structures::TaggedValue;
use autonomous_trust_core::Error;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[test]
fn test_hand_written_registry_loads_in_any_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(REGISTRY_FILENAME);
    std::fs::write(
        &path,
        r#"{
            "subsystems": [
                {"network": "udp_net_4"},
                {"identity": "id_proc"},
                {"negotiation": "negotiator"}
            ],
            "typename": "process_tracker"
        }"#,
    )
    .unwrap();

    let loaded = ProcessRegistry::from_file(&path).unwrap().registry;
    assert_eq!(
        loaded.categories().collect::<Vec<_>>(),
        vec!["network", "identity", "negotiation"]
    );

    let mut reordered = ProcessRegistry::new();
    reordered.register("negotiation", "negotiator").unwrap();
    reordered.register("identity", "id_proc").unwrap();
    reordered.register("network", "udp_net_4").unwrap();

    let expected: BTreeSet<_> = reordered.entries().collect();
    let actual: BTreeSet<_> = loaded.entries().collect();
    assert_eq!(actual, expected);

    // Saving and reloading keeps the same mapping.
    reordered.to_file(&path).unwrap();
    let reloaded = ProcessRegistry::from_file(&path).unwrap().registry;
    let actual: BTreeSet<_> = reloaded.entries().collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_malformed_registry_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(REGISTRY_FILENAME);

    std::fs::write(&path, "[").unwrap();
    assert!(matches!(
        ProcessRegistry::from_file(&path),
        Err(Error::ConfigFormat(_))
    ));

    std::fs::write(&path, r#"{"subsystems": [{"network": "udp_net_4"}]}"#).unwrap();
    assert!(matches!(
        ProcessRegistry::from_file(&path),
        Err(Error::ConfigFormat(_))
    ));

    std::fs::write(
        &path,
        r#"{"typename": "process_tracker", "subsystems": [{"net/work": "udp_net_4"}]}"#,
    )
    .unwrap();
    let scan = ProcessRegistry::from_file(&path).unwrap();
    assert!(scan.registry.is_empty());
    assert!(matches!(scan.failures[..], [(0, Error::ConfigFormat(_))]));

    assert!(matches!(
        ProcessRegistry::from_file(&dir.path().join("absent.cfg.json")),
        Err(Error::Io(_))
    ));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SensorConfig {
    interval_ms: u64,
    channels: Vec<String>,
}

impl ConfigDocument for SensorConfig {
    const TYPENAME: &'static str = "sensor";
}

#[test]
fn test_downstream_document_type() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sensor.cfg.json"),
        r#"{"typename": "sensor", "interval_ms": 250, "channels": ["imu", "gps"]}"#,
    )
    .unwrap();

    let builtin = ConfigRegistry::builtin();
    let scan = builtin.load_directory(dir.path(), REGISTRY_FILENAME).unwrap();
    assert!(scan.configs.is_empty());
    assert!(matches!(
        scan.failures[0].1,
        Error::ConfigNotRegistered(_)
    ));

    let mut converters = ConfigRegistry::builtin();
    converters.register::<SensorConfig>();
    let converter = converters.find("sensor").unwrap();
    assert_eq!(converter.payload_size, std::mem::size_of::<SensorConfig>());

    let scan = converters.load_directory(dir.path(), REGISTRY_FILENAME).unwrap();
    let sensor = scan
        .configs
        .get("sensor")
        .unwrap()
        .downcast::<SensorConfig>()
        .unwrap();
    assert_eq!(sensor.interval_ms, 250);
    assert_eq!(sensor.channels, vec!["imu".to_string(), "gps".to_string()]);

    // Encoding a value of the wrong type fails cleanly.
    assert!(matches!(
        converters.write_file(
            "sensor",
            &TaggedValue::int(3),
            &dir.path().join("bad.cfg.json")
        ),
        Err(Error::TypeMismatch { .. })
    ));
}
