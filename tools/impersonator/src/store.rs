//! Durable storage for recorded invocation lists, keyed by storage key.

use crate::errors::ImpersonatorError;
use crate::logging::append_run_log;
use crate::replay::method::MethodInvocation;
use crate::storage_key::validate_key;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const FORMAT_VERSION: u32 = 1;
pub const RECORDING_EXTENSION: &str = "json";

pub trait InvocationStore: Send + Sync {
    fn exists(&self, key: &str) -> bool;
    /// Like `exists`, but a backend failure is an error instead of `false`.
    fn try_exists(&self, key: &str) -> Result<bool, ImpersonatorError> {
        Ok(self.exists(key))
    }
    fn read(&self, key: &str) -> Result<Vec<MethodInvocation>, ImpersonatorError>;
    /// Replace whatever is stored under `key`.
    fn write(&self, key: &str, invocations: &[MethodInvocation]) -> Result<(), ImpersonatorError>;
    fn keys(&self) -> Result<Vec<String>, ImpersonatorError>;
    /// Returns whether something was removed.
    fn remove(&self, key: &str) -> Result<bool, ImpersonatorError>;

    /// Make sure a later `write` for `key` can succeed.
    fn prepare(&self, _key: &str) -> Result<(), ImpersonatorError> {
        Ok(())
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecording {
    format_version: u32,
    method_invocations: Vec<MethodInvocation>,
}

/// Encode `invocations` as a pretty-printed JSON document.
pub fn encode_invocations(invocations: &[MethodInvocation]) -> Result<String, ImpersonatorError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        format_version: u32,
        method_invocations: &'a [MethodInvocation],
    }
    serde_json::to_string_pretty(&Borrowed {
        format_version: FORMAT_VERSION,
        method_invocations: invocations,
    })
    .map_err(|e| ImpersonatorError::Storage(e.to_string()))
}

pub fn decode_invocations(raw: &str) -> Result<Vec<MethodInvocation>, ImpersonatorError> {
    let stored: StoredRecording = serde_json::from_str(raw)
        .map_err(|e| ImpersonatorError::Storage(format!("malformed recording: {e}")))?;
    if stored.format_version != FORMAT_VERSION {
        return Err(ImpersonatorError::Storage(format!(
            "unsupported recording format version {} (expected {FORMAT_VERSION})",
            stored.format_version
        )));
    }
    Ok(stored.method_invocations)
}

/// Short content digest of an encoded document, `sha256:` plus the first
/// 8 bytes in hex. Logged on every write so reruns can be compared.
pub fn document_digest(document: &str) -> String {
    let hash = Sha256::digest(document.as_bytes());
    let prefix = hash[..8]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("sha256:{prefix}")
}

// ── FileStore ─────────────────────────────────────────────────────────────────

/// One JSON document per key, at `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<key>.json`. Keys that are not plain file names are refused so
    /// every recording stays directly under the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, ImpersonatorError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{RECORDING_EXTENSION}")))
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), ImpersonatorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ImpersonatorError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

impl InvocationStore for FileStore {
    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|path| path.is_file())
    }

    fn try_exists(&self, key: &str) -> Result<bool, ImpersonatorError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ImpersonatorError::Storage(format!(
                "cannot inspect {}: {e}",
                path.display()
            ))),
        }
    }

    fn read(&self, key: &str) -> Result<Vec<MethodInvocation>, ImpersonatorError> {
        let path = self.path_for(key)?;
        let raw = fs::read_to_string(&path).map_err(|e| {
            ImpersonatorError::Storage(format!("cannot read {}: {e}", path.display()))
        })?;
        let invocations = decode_invocations(&raw).map_err(|e| match e {
            ImpersonatorError::Storage(message) => {
                ImpersonatorError::Storage(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        append_run_log(
            "debug",
            "store.file.read",
            json!({ "path": path.display().to_string(), "invocations": invocations.len() }),
        );
        Ok(invocations)
    }

    fn write(&self, key: &str, invocations: &[MethodInvocation]) -> Result<(), ImpersonatorError> {
        let path = self.path_for(key)?;
        self.ensure_parent(&path)?;
        let document = encode_invocations(invocations)?;
        fs::write(&path, &document).map_err(|e| ImpersonatorError::Io(e.to_string()))?;
        append_run_log(
            "debug",
            "store.file.written",
            json!({
                "path": path.display().to_string(),
                "invocations": invocations.len(),
                "digest": document_digest(&document),
            }),
        );
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, ImpersonatorError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = fs::read_dir(&self.root)
            .map_err(|e| ImpersonatorError::Io(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(RECORDING_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<bool, ImpersonatorError> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| ImpersonatorError::Io(e.to_string()))?;
        append_run_log(
            "info",
            "store.file.removed",
            json!({ "path": path.display().to_string() }),
        );
        Ok(true)
    }

    fn prepare(&self, key: &str) -> Result<(), ImpersonatorError> {
        self.ensure_parent(&self.path_for(key)?)
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// In-process store. Documents go through the same codec as `FileStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Store a raw document under `key`, bypassing the encoder.
    pub fn insert_raw(&self, key: &str, document: impl Into<String>) -> Result<(), ImpersonatorError> {
        self.documents()?.insert(key.to_string(), document.into());
        Ok(())
    }

    fn documents(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, ImpersonatorError> {
        self.documents
            .lock()
            .map_err(|_| ImpersonatorError::Storage("memory store lock poisoned".to_string()))
    }
}

impl InvocationStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.documents()
            .map(|documents| documents.contains_key(key))
            .unwrap_or(false)
    }

    fn read(&self, key: &str) -> Result<Vec<MethodInvocation>, ImpersonatorError> {
        let documents = self.documents()?;
        let raw = documents
            .get(key)
            .ok_or_else(|| ImpersonatorError::Storage(format!("no recording stored for `{key}`")))?;
        decode_invocations(raw)
    }

    fn write(&self, key: &str, invocations: &[MethodInvocation]) -> Result<(), ImpersonatorError> {
        let document = encode_invocations(invocations)?;
        self.documents()?.insert(key.to_string(), document);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, ImpersonatorError> {
        Ok(self.documents()?.keys().cloned().collect())
    }

    fn remove(&self, key: &str) -> Result<bool, ImpersonatorError> {
        Ok(self.documents()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::method::{BlockInvocation, BlockSpy, Method};
    use serde_json::Value;

    fn sample() -> Vec<MethodInvocation> {
        let mut yielding = Method::new("lineal_sequence", vec![json!(2)], true);
        yielding.block_spy = Some(BlockSpy {
            block_invocations: vec![
                BlockInvocation { arguments: vec![json!(1)] },
                BlockInvocation { arguments: vec![json!(2), json!("two")] },
            ],
        });
        vec![
            MethodInvocation {
                method_instance: Method::new("sum", vec![json!(1), json!(2.5)], false),
                return_value: json!(3.5),
            },
            MethodInvocation {
                method_instance: yielding,
                return_value: Value::Null,
            },
            MethodInvocation {
                method_instance: Method::new("tap", vec![], true),
                return_value: json!({"ok": true}),
            },
        ]
    }

    #[test]
    fn file_store_preserves_descriptor_details() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested").join("recordings"));
        assert!(!store.exists("calc"));
        store.write("calc", &sample()).expect("write");
        assert!(store.exists("calc"));
        assert!(store.path_for("calc").expect("path").ends_with("nested/recordings/calc.json"));

        let back = store.read("calc").expect("read");
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].method_instance.arguments, vec![json!(1), json!(2.5)]);
        assert_eq!(back[0].return_value, json!(3.5));
        assert!(!back[0].method_instance.has_block());
        let spy = back[1].method_instance.block_spy.as_ref().expect("spy");
        assert_eq!(spy.block_invocations[1].arguments, vec![json!(2), json!("two")]);
        let empty_spy = back[2].method_instance.block_spy.as_ref().expect("spy");
        assert!(empty_spy.is_empty());
    }

    #[test]
    fn write_overwrites_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.write("calc", &sample()).expect("first write");
        store.write("calc", &sample()[..1]).expect("second write");
        assert_eq!(store.read("calc").expect("read").len(), 1);
    }

    #[test]
    fn malformed_documents_are_storage_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        fs::write(store.path_for("broken").expect("path"), "{ not json").expect("write");
        let error = store.read("broken").expect_err("malformed");
        assert!(error.is_storage());

        let memory = MemoryStore::default();
        memory
            .insert_raw("old", r#"{"format_version": 99, "method_invocations": []}"#)
            .expect("insert");
        let error = memory.read("old").expect_err("version");
        assert!(error.to_string().contains("unsupported recording format version 99"));
    }

    #[test]
    fn keys_lists_only_recordings_and_remove_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.write("b-key", &sample()).expect("write b");
        store.write("a-key", &sample()).expect("write a");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write notes");

        assert_eq!(store.keys().expect("keys"), vec!["a-key", "b-key"]);
        assert!(store.remove("a-key").expect("remove"));
        assert!(!store.remove("a-key").expect("remove again"));
        assert_eq!(store.keys().expect("keys"), vec!["b-key"]);
    }

    #[test]
    fn missing_root_has_no_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("absent"));
        assert!(store.keys().expect("keys").is_empty());
        store.prepare("k").expect("prepare");
        assert!(dir.path().join("absent").is_dir());
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let document = encode_invocations(&sample()).expect("encode");
        let digest = document_digest(&document);
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 16);
        assert_eq!(digest, document_digest(&document));
        assert_ne!(digest, document_digest(&encode_invocations(&[]).expect("encode")));
    }

    #[test]
    fn file_store_refuses_keys_that_leave_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("recordings"));
        for key in ["team/alpha", "../escaped", ".."] {
            assert!(store.write(key, &sample()).expect_err(key).is_configuration());
            assert!(!store.exists(key));
            assert!(store.try_exists(key).is_err());
        }
        assert!(!dir.path().join("escaped.json").exists());
        assert!(!dir.path().join("recordings/team").exists());
        assert!(store.keys().expect("keys").is_empty());
    }

    #[test]
    fn try_exists_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert!(!store.try_exists("calc").expect("absent"));
        store.write("calc", &sample()).expect("write");
        assert!(store.try_exists("calc").expect("present"));
    }
}
