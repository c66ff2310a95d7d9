//! Ledger lifecycle through the public API: load, append, persist, tamper, repair.

use std::fs;

use file_ledger::storage::{load_ledger, save_ledger};
use file_ledger::{ChainFault, Record};
use tempfile::TempDir;

#[test]
fn fresh_start_two_uploads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    assert!(!path.exists());

    let mut ledger = load_ledger(&path).unwrap();
    assert!(path.exists());

    ledger.append(Record::new("a.txt", "abc123"));
    ledger.append(Record::new("b.txt", "def456"));

    assert!(ledger.validate());
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.blocks()[2].previous_hash(), ledger.blocks()[1].hash());

    save_ledger(&ledger, &path).unwrap();
    let reloaded = load_ledger(&path).unwrap();
    assert_eq!(reloaded.blocks(), ledger.blocks());
    assert_eq!(reloaded.latest_block().unwrap().record().name, "b.txt");
}

#[test]
fn garbage_file_is_overwritten_with_genesis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    fs::write(&path, "not json at all").unwrap();

    let ledger = load_ledger(&path).unwrap();
    assert_eq!(ledger.len(), 1);

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let blocks = on_disk.as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["index"], 0);
    assert_eq!(blocks[0]["previous_hash"], "0");
    assert_eq!(blocks[0]["record"]["name"], "genesis");
}

#[test]
fn tampered_file_is_kept_until_repaired() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    let mut ledger = load_ledger(&path).unwrap();
    for name in ["one.bin", "two.bin", "three.bin"] {
        ledger.append(Record::new(name, format!("sha-of-{name}")));
    }
    save_ledger(&ledger, &path).unwrap();

    let raw = fs::read_to_string(&path)
        .unwrap()
        .replace("sha-of-two.bin", "sha-of-evil.bin");
    fs::write(&path, raw).unwrap();

    let mut loaded = load_ledger(&path).unwrap();
    assert_eq!(loaded.len(), 4);
    assert!(!loaded.validate());
    assert_eq!(loaded.validation_errors(), &[ChainFault::InvalidHash(2)]);

    assert!(loaded.repair());
    assert!(loaded.validate());
    assert_eq!(loaded.blocks()[2].record().digest, "sha-of-evil.bin");
    assert_eq!(loaded.blocks()[1].hash(), ledger.blocks()[1].hash());
}
