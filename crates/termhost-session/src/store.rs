//! Persistence of console process records and transcripts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use termhost_core::{ConsoleHandle, ConsoleProcessInfo, Error, Result};

const RECORDS_FILE: &str = "console-processes.json";
const BUFFERS_DIR: &str = "buffers";

/// Storage for persisted console state.
pub trait SessionStore: Send + Sync {
    /// Replace the saved records.
    fn save_records(&self, records: &[ConsoleProcessInfo]) -> Result<()>;

    /// Load saved records. Empty when nothing was saved.
    fn load_records(&self) -> Result<Vec<ConsoleProcessInfo>>;

    /// Save the transcript of one process.
    fn save_buffer(&self, handle: &ConsoleHandle, buffer: &str) -> Result<()>;

    /// Load the transcript of one process.
    fn load_buffer(&self, handle: &ConsoleHandle) -> Result<Option<String>>;

    /// Delete the transcript of one process.
    fn delete_buffer(&self, handle: &ConsoleHandle) -> Result<()>;
}

/// Persists the state of every console process after a visible mutation.
pub trait StateSaver: Send + Sync {
    /// Save now. Failures are logged, never returned.
    fn save_state(&self);
}

/// JSON records plus one transcript file per process, under a directory.
///
/// Clones share one write lock, so writes from different threads never
/// interleave.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(BUFFERS_DIR))?;
        debug!("Using state directory: {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// The state directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Transcript path for `handle`. Handles that could leave the buffers
    /// directory are refused.
    fn buffer_path(&self, handle: &ConsoleHandle) -> Result<PathBuf> {
        if !handle.is_well_formed() {
            return Err(Error::InvalidInput(format!(
                "console handle cannot name a transcript file: {:?}",
                handle.as_str()
            )));
        }
        Ok(self.dir.join(BUFFERS_DIR).join(format!("{}.log", handle.as_str())))
    }

    /// Write via a temporary file so readers never see a partial file.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn save_records(&self, records: &[ConsoleProcessInfo]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        self.write_atomic(&self.dir.join(RECORDS_FILE), &json)
    }

    fn load_records(&self) -> Result<Vec<ConsoleProcessInfo>> {
        let path = self.dir.join(RECORDS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read(&path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    fn save_buffer(&self, handle: &ConsoleHandle, buffer: &str) -> Result<()> {
        if handle.is_empty() {
            warn!("Refusing to save buffer without a handle");
            return Ok(());
        }
        let path = self.buffer_path(handle)?;
        self.write_atomic(&path, buffer.as_bytes())
    }

    fn load_buffer(&self, handle: &ConsoleHandle) -> Result<Option<String>> {
        let path = self.buffer_path(handle)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn delete_buffer(&self, handle: &ConsoleHandle) -> Result<()> {
        let path = self.buffer_path(handle)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
