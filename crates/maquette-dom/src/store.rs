#![forbid(unsafe_code)]

//! The persistence boundary.
//!
//! Documents are saved as a mutable "preview" and released as numbered,
//! immutable versions. [`DomStore`] is the external-collaborator interface;
//! [`MemoryStore`] backs tests and ephemeral sessions, [`FileStore`]
//! persists JSON documents with atomic write-then-rename.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::tree::AppDom;

/// A released version number or the mutable preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppVersion {
    /// The editable working copy.
    Preview,
    /// Released version `N`; numbering starts at 1 and only grows.
    Release(u64),
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AppVersion::Preview => serializer.serialize_str("preview"),
            AppVersion::Release(n) => serializer.serialize_u64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(AppVersion::Release(n)),
            Repr::Text(s) if s == "preview" => Ok(AppVersion::Preview),
            Repr::Text(s) => Err(D::Error::custom(format!("unknown app version {s:?}"))),
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppVersion::Preview => f.write_str("preview"),
            AppVersion::Release(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for AppVersion {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "preview" {
            return Ok(AppVersion::Preview);
        }
        s.parse::<u64>()
            .map(AppVersion::Release)
            .map_err(|_| StoreError::Corruption(format!("unknown app version {s:?}")))
    }
}

/// Errors raised at the persistence boundary.
#[derive(Debug)]
pub enum StoreError {
    /// The app or version does not exist.
    NotFound {
        /// Requested app.
        app_id: String,
        /// Requested version.
        version: AppVersion,
    },
    /// App ids are restricted to `[A-Za-z0-9_-]`.
    InvalidAppId(String),
    /// I/O failure while reading or writing documents.
    Io(io::Error),
    /// JSON encode/decode failure.
    Serialization(String),
    /// The stored document violates tree invariants.
    Corruption(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { app_id, version } => {
                write!(f, "no version {version} of app {app_id:?}")
            }
            StoreError::InvalidAppId(app_id) => write!(f, "invalid app id {app_id:?}"),
            StoreError::Io(err) => write!(f, "I/O error: {err}"),
            StoreError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StoreError::Corruption(msg) => write!(f, "document corruption: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Versioned document storage.
///
/// Implementations must be thread-safe; the editor and runtime may read
/// concurrently while the editor saves.
pub trait DomStore: Send + Sync {
    /// Human-readable backend name for logging.
    fn name(&self) -> &str;

    /// Load one version of an app's document.
    ///
    /// Unknown apps and versions fail with [`StoreError::NotFound`].
    fn load_versioned_dom(&self, app_id: &str, version: AppVersion) -> Result<AppDom, StoreError>;

    /// Save the preview document for an app.
    fn save_dom(&self, app_id: &str, dom: &AppDom) -> Result<(), StoreError>;

    /// Snapshot the current preview as the next release and return its
    /// version number.
    fn release(&self, app_id: &str) -> Result<AppVersion, StoreError>;
}

fn validate_app_id(app_id: &str) -> Result<(), StoreError> {
    let ok = !app_id.is_empty()
        && app_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidAppId(app_id.to_string()))
    }
}

// ── In-memory backend ──────────────────────────────────────────────────

#[derive(Default)]
struct AppRecord {
    preview: Option<AppDom>,
    releases: Vec<AppDom>,
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    apps: RwLock<HashMap<String, AppRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_versioned_dom(&self, app_id: &str, version: AppVersion) -> Result<AppDom, StoreError> {
        validate_app_id(app_id)?;
        let apps = self.apps.read().unwrap();
        let record = apps.get(app_id).ok_or_else(|| StoreError::NotFound {
            app_id: app_id.to_string(),
            version,
        })?;
        let dom = match version {
            AppVersion::Preview => record.preview.as_ref(),
            AppVersion::Release(n) => n
                .checked_sub(1)
                .and_then(|i| record.releases.get(i as usize)),
        };
        dom.cloned().ok_or_else(|| StoreError::NotFound {
            app_id: app_id.to_string(),
            version,
        })
    }

    fn save_dom(&self, app_id: &str, dom: &AppDom) -> Result<(), StoreError> {
        validate_app_id(app_id)?;
        let mut apps = self.apps.write().unwrap();
        apps.entry(app_id.to_string()).or_default().preview = Some(dom.clone());
        Ok(())
    }

    fn release(&self, app_id: &str) -> Result<AppVersion, StoreError> {
        validate_app_id(app_id)?;
        let mut apps = self.apps.write().unwrap();
        let record = apps.get_mut(app_id).ok_or_else(|| StoreError::NotFound {
            app_id: app_id.to_string(),
            version: AppVersion::Preview,
        })?;
        let preview = record.preview.clone().ok_or_else(|| StoreError::NotFound {
            app_id: app_id.to_string(),
            version: AppVersion::Preview,
        })?;
        record.releases.push(preview);
        Ok(AppVersion::Release(record.releases.len() as u64))
    }
}

// ── File backend ───────────────────────────────────────────────────────

/// JSON file store, one document per app version.
///
/// Layout: `<root>/<app_id>/preview.json` and
/// `<root>/<app_id>/release-<N>.json`. Writes go through a temporary file
/// and `rename` so a crash never leaves a half-written document behind.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn app_dir(&self, app_id: &str) -> Result<PathBuf, StoreError> {
        validate_app_id(app_id)?;
        Ok(self.root.join(app_id))
    }

    fn version_path(dir: &Path, version: AppVersion) -> PathBuf {
        match version {
            AppVersion::Preview => dir.join("preview.json"),
            AppVersion::Release(n) => dir.join(format!("release-{n}.json")),
        }
    }

    fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn next_release_number(dir: &Path) -> Result<u64, StoreError> {
        let mut max = 0u64;
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = name
                .strip_prefix("release-")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u64>().ok())
            {
                max = max.max(n);
            }
        }
        Ok(max + 1)
    }
}

impl DomStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn load_versioned_dom(&self, app_id: &str, version: AppVersion) -> Result<AppDom, StoreError> {
        let dir = self.app_dir(app_id)?;
        let path = Self::version_path(&dir, version);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    app_id: app_id.to_string(),
                    version,
                });
            }
            Err(err) => return Err(err.into()),
        };
        let dom: AppDom = serde_json::from_str(&contents)?;
        dom.validate()
            .map_err(|err| StoreError::Corruption(err.to_string()))?;
        debug!(app = app_id, %version, "loaded document");
        Ok(dom)
    }

    fn save_dom(&self, app_id: &str, dom: &AppDom) -> Result<(), StoreError> {
        let dir = self.app_dir(app_id)?;
        fs::create_dir_all(&dir)?;
        let contents = serde_json::to_string_pretty(dom)?;
        Self::write_atomic(&Self::version_path(&dir, AppVersion::Preview), &contents)?;
        debug!(app = app_id, "saved preview");
        Ok(())
    }

    fn release(&self, app_id: &str) -> Result<AppVersion, StoreError> {
        let dir = self.app_dir(app_id)?;
        let preview = self.load_versioned_dom(app_id, AppVersion::Preview)?;
        let n = Self::next_release_number(&dir)?;
        let contents = serde_json::to_string_pretty(&preview)?;
        Self::write_atomic(&Self::version_path(&dir, AppVersion::Release(n)), &contents)?;
        debug!(app = app_id, release = n, "released");
        Ok(AppVersion::Release(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dom() -> AppDom {
        AppDom::new("sample")
    }

    #[test]
    fn version_serde_forms() {
        assert_eq!(
            serde_json::to_string(&AppVersion::Preview).unwrap(),
            "\"preview\""
        );
        assert_eq!(serde_json::to_string(&AppVersion::Release(3)).unwrap(), "3");
        assert_eq!(
            serde_json::from_str::<AppVersion>("\"preview\"").unwrap(),
            AppVersion::Preview
        );
        assert_eq!(
            serde_json::from_str::<AppVersion>("7").unwrap(),
            AppVersion::Release(7)
        );
        assert!(serde_json::from_str::<AppVersion>("\"latest\"").is_err());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let dom = sample_dom();
        store.save_dom("app-1", &dom).unwrap();
        let loaded = store
            .load_versioned_dom("app-1", AppVersion::Preview)
            .unwrap();
        assert_eq!(loaded.root(), dom.root());
    }

    #[test]
    fn memory_store_unknown_app_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_versioned_dom("nope", AppVersion::Preview),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn memory_store_release_sequence() {
        let store = MemoryStore::new();
        store.save_dom("app", &sample_dom()).unwrap();
        assert_eq!(store.release("app").unwrap(), AppVersion::Release(1));
        store.save_dom("app", &sample_dom()).unwrap();
        assert_eq!(store.release("app").unwrap(), AppVersion::Release(2));
        assert!(store.load_versioned_dom("app", AppVersion::Release(1)).is_ok());
        assert!(matches!(
            store.load_versioned_dom("app", AppVersion::Release(3)),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.load_versioned_dom("app", AppVersion::Release(0)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn rejects_path_like_app_ids() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.save_dom("../escape", &sample_dom()),
            Err(StoreError::InvalidAppId(_))
        ));
    }

    #[test]
    fn file_store_round_trip_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let dom = sample_dom();
        store.save_dom("demo", &dom).unwrap();

        let loaded = store.load_versioned_dom("demo", AppVersion::Preview).unwrap();
        assert_eq!(loaded.root(), dom.root());

        assert_eq!(store.release("demo").unwrap(), AppVersion::Release(1));
        assert_eq!(store.release("demo").unwrap(), AppVersion::Release(2));
        let release_1 = store.load_versioned_dom("demo", AppVersion::Release(1)).unwrap();
        assert_eq!(release_1.root(), dom.root());
        assert!(matches!(
            store.load_versioned_dom("demo", AppVersion::Release(9)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn file_store_rejects_garbage_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        fs::create_dir_all(dir.path().join("demo")).unwrap();
        fs::write(dir.path().join("demo/preview.json"), "{not json").unwrap();
        assert!(matches!(
            store.load_versioned_dom("demo", AppVersion::Preview),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn file_store_missing_app_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load_versioned_dom("demo", AppVersion::Preview),
            Err(StoreError::NotFound { .. })
        ));
    }
}
