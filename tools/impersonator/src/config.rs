use crate::errors::ImpersonatorError;
use crate::logging::{init_run_logger, JsonlLogger, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::sqlite_store::SqliteStore;
use crate::store::{FileStore, InvocationStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILE_NAME: &str = "impersonator.toml";
pub const DEFAULT_RECORDINGS_FOLDER: &str = "recordings";
pub const DEFAULT_DATABASE_FILE: &str = "recordings.sqlite3";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub recordings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub recordings_path: PathBuf,
    pub backend: StoreBackend,
    pub database_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Settings {
    /// Defaults for a project rooted at `working_dir`: recordings live under
    /// `tests/recordings` when the project has a `tests` directory, otherwise
    /// under `recordings`.
    pub fn for_working_dir(working_dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                recordings_path: default_recordings_path(working_dir),
                backend: StoreBackend::File,
                database_file: DEFAULT_DATABASE_FILE.to_string(),
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }

    pub fn with_recordings_path(mut self, recordings_path: impl Into<PathBuf>) -> Self {
        self.storage.recordings_path = recordings_path.into();
        self
    }

    pub fn open_store(&self) -> Result<Arc<dyn InvocationStore>, ImpersonatorError> {
        match self.storage.backend {
            StoreBackend::File => Ok(Arc::new(FileStore::new(&self.storage.recordings_path))),
            StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(
                self.storage
                    .recordings_path
                    .join(&self.storage.database_file),
            )?)),
        }
    }

    /// Install the run logger when a log path is configured.
    pub fn init_logging(&self) {
        if let Some(path) = &self.logging.path {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = self.logging.max_payload_bytes;
            init_run_logger(logger);
        }
    }
}

pub fn default_recordings_path(working_dir: &Path) -> PathBuf {
    let tests_dir = working_dir.join("tests");
    if tests_dir.is_dir() {
        tests_dir.join(DEFAULT_RECORDINGS_FOLDER)
    } else {
        working_dir.join(DEFAULT_RECORDINGS_FOLDER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSettings {
    storage: Option<PartialStorageConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStorageConfig {
    recordings_path: Option<PathBuf>,
    backend: Option<StoreBackend>,
    database_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, then the config file (explicit `--config`, or `impersonator.toml`
/// in the working directory when present), then CLI overrides. Relative paths
/// resolve against the working directory.
pub fn load_settings(
    overrides: &CliOverrides,
    process_cwd: &Path,
) -> Result<Settings, ImpersonatorError> {
    let working_dir = match &overrides.working_dir {
        Some(dir) => resolve(process_cwd, dir),
        None => process_cwd.to_path_buf(),
    };
    let mut settings = Settings::for_working_dir(&working_dir);

    let config_path = match &overrides.config_path {
        Some(path) => Some(resolve(process_cwd, path)),
        None => {
            let candidate = working_dir.join(CONFIG_FILE_NAME);
            candidate.is_file().then_some(candidate)
        }
    };
    if let Some(path) = config_path {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ImpersonatorError::Io(format!("{}: {e}", path.display())))?;
        let partial: PartialSettings = toml::from_str(&contents)
            .map_err(|e| ImpersonatorError::ConfigParse(e.to_string()))?;
        merge_partial_settings(&mut settings, partial, &working_dir);
    }

    if let Some(recordings_path) = &overrides.recordings_path {
        settings.storage.recordings_path = resolve(process_cwd, recordings_path);
    }

    validate_settings(&settings)?;
    Ok(settings)
}

fn merge_partial_settings(settings: &mut Settings, partial: PartialSettings, working_dir: &Path) {
    if let Some(storage) = partial.storage {
        if let Some(recordings_path) = storage.recordings_path {
            settings.storage.recordings_path = resolve(working_dir, &recordings_path);
        }
        if let Some(backend) = storage.backend {
            settings.storage.backend = backend;
        }
        if let Some(database_file) = storage.database_file {
            settings.storage.database_file = database_file;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            settings.logging.path = Some(resolve(working_dir, &path));
        }
        if let Some(max_payload_bytes) = logging.max_payload_bytes {
            settings.logging.max_payload_bytes = max_payload_bytes;
        }
    }
}

fn validate_settings(settings: &Settings) -> Result<(), ImpersonatorError> {
    if settings.storage.recordings_path.as_os_str().is_empty() {
        return Err(ImpersonatorError::Configuration(
            "storage.recordings_path must not be empty".to_string(),
        ));
    }
    if settings.storage.backend == StoreBackend::Sqlite
        && settings.storage.database_file.trim().is_empty()
    {
        return Err(ImpersonatorError::Configuration(
            "storage.database_file must not be empty for the sqlite backend".to_string(),
        ));
    }
    if settings.logging.max_payload_bytes == 0 {
        return Err(ImpersonatorError::Configuration(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
