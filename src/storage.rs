//! Disk persistence for the ledger (one pretty-printed JSON array).

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::model::{Block, Ledger};

/// Ensure that the given directory exists (create recursively if needed).
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Write every block, in order, to `path`.
///
/// The file is written next to its destination and renamed into place, so a
/// failed write never leaves a truncated ledger behind.
pub fn save_ledger(ledger: &Ledger, path: &Path) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    ledger.blocks().serialize(&mut ser)?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &buf)?;
    fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), blocks = ledger.len(), "saved ledger");
    Ok(())
}

/// Load the ledger stored at `path`.
///
/// - Missing file: a genesis-only ledger is created and saved.
/// - Unparsable or empty file: the content is discarded, a genesis-only
///   ledger is created and saved over it.
/// - Parsed but invalid chain: kept as loaded, with a warning. Call
///   [`Ledger::repair`] to fix it.
pub fn load_ledger(path: &Path) -> Result<Ledger, LedgerError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no ledger file found; creating genesis");
            return reinitialize(path);
        }
        Err(e) => return Err(LedgerError::Io(e)),
    };

    let blocks = match serde_json::from_str::<Vec<Block>>(&raw) {
        Ok(blocks) if !blocks.is_empty() => blocks,
        Ok(_) => {
            warn!(path = %path.display(), "ledger file holds no blocks; reinitializing");
            return reinitialize(path);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ledger file unreadable; reinitializing");
            return reinitialize(path);
        }
    };

    let mut ledger = Ledger::from_blocks(blocks);
    if ledger.validate() {
        info!(path = %path.display(), blocks = ledger.len(), "loaded ledger");
    } else {
        let errors: Vec<String> = ledger.validation_errors().iter().map(ToString::to_string).collect();
        warn!(path = %path.display(), ?errors, "loaded ledger is invalid; keeping it until repaired");
    }
    Ok(ledger)
}

fn reinitialize(path: &Path) -> Result<Ledger, LedgerError> {
    let ledger = Ledger::new();
    save_ledger(&ledger, path)?;
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainFault;
    use crate::model::Record;
    use tempfile::TempDir;

    #[test]
    fn missing_file_creates_and_saves_genesis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = load_ledger(&path).unwrap();

        assert_eq!(ledger.len(), 1);
        assert!(ledger.validate());
        assert!(path.exists());
        let reloaded = load_ledger(&path).unwrap();
        assert_eq!(reloaded.blocks(), ledger.blocks());
    }

    #[test]
    fn save_then_load_reproduces_every_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let mut ledger = Ledger::new();
        ledger.append(Record::new("a.txt", "abc123"));
        ledger.append(Record::new("b.txt", "def456"));

        save_ledger(&ledger, &path).unwrap();
        let loaded = load_ledger(&path).unwrap();

        assert_eq!(loaded.blocks(), ledger.blocks());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn saved_file_uses_documented_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::new();
        ledger.append(Record::new("a.txt", "abc123"));
        save_ledger(&ledger, &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n    {\n        \"index\": 0,"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = value[1].as_object().unwrap();
        let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["hash", "index", "previous_hash", "record", "timestamp"]);
        assert_eq!(value[1]["record"]["name"], "a.txt");
        assert_eq!(value[1]["record"]["digest"], "abc123");
    }

    #[test]
    fn corrupt_file_is_replaced_by_genesis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ this is not json").unwrap();

        let ledger = load_ledger(&path).unwrap();

        assert_eq!(ledger.len(), 1);
        let on_disk: Vec<Block> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.as_slice(), ledger.blocks());
    }

    #[test]
    fn missing_fields_are_treated_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, r#"[{"index": 0, "timestamp": 1.0, "previous_hash": "0"}]"#).unwrap();

        let ledger = load_ledger(&path).unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.blocks()[0].record(), &Record::new("genesis", "0"));
    }

    #[test]
    fn empty_array_is_treated_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "[]").unwrap();

        let mut ledger = load_ledger(&path).unwrap();

        assert_eq!(ledger.len(), 1);
        assert!(ledger.validate());
    }

    #[test]
    fn invalid_chain_is_kept_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::new();
        ledger.append(Record::new("a.txt", "digest-of-a"));
        ledger.append(Record::new("b.txt", "digest-of-b"));
        save_ledger(&ledger, &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap().replace("digest-of-a", "tampered");
        fs::write(&path, raw).unwrap();

        let mut loaded = load_ledger(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.validation_errors(), &[ChainFault::InvalidHash(1)]);
        assert_eq!(loaded.blocks()[1].record().digest, "tampered");

        assert!(loaded.repair());
        assert!(loaded.validate());
        save_ledger(&loaded, &path).unwrap();
        let mut reloaded = load_ledger(&path).unwrap();
        assert!(reloaded.validate());
    }
}
