use {
    crate::{pipeline::types::SequenceNumber, region::BoundingBox},
    serde::{Deserialize, Serialize},
    std::{
        fs::{self, File, OpenOptions},
        io::{self, Write},
        path::{Path, PathBuf},
        sync::Mutex,
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: invalid settings JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable settings record
///
/// `last` is the checkpoint: the last sequence whose batch was fully
/// delivered. `null` means the feed has never run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub last: Option<SequenceNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// Keys this crate does not use, kept so rewrites do not drop them
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Settings file owning the checkpoint
///
/// Read once at startup; rewritten after each committed batch using
/// write-to-temp, fsync, rename, so a crash never leaves a half-written file.
pub struct CheckpointStore {
    path: PathBuf,
    settings: Mutex<Settings>,
}

impl CheckpointStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let json = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| PersistenceError::Json {
                path: path.clone(),
                source,
            })?;

        log::info!(
            "Loaded settings from {} (last processed: {:?})",
            path.display(),
            settings.last
        );
        Ok(Self {
            path,
            settings: Mutex::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> Settings {
        self.lock().clone()
    }

    pub fn last_processed(&self) -> Option<SequenceNumber> {
        self.lock().last
    }

    /// Persist `sequence` as the new checkpoint.
    ///
    /// The in-memory value only changes once the file write succeeded.
    pub fn commit(&self, sequence: SequenceNumber) -> Result<(), PersistenceError> {
        let mut settings = self.lock();
        let mut updated = settings.clone();
        updated.last = Some(sequence);
        save_atomic(&self.path, &updated)?;
        *settings = updated;

        log::debug!("Saved checkpoint {} to {}", sequence, self.path.display());
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        // Settings are replaced wholesale, a poisoned guard still holds a valid value
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn save_atomic(path: &Path, settings: &Settings) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(settings).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp_path, path).map_err(io_err)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(io_err)?;
    }
    Ok(())
}
