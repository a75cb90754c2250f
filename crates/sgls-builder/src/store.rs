use std::collections::HashMap;
use std::io;

use camino::Utf8PathBuf;
use sgls_document::Mode;

use crate::StoreError;

/// Last document per mode. Implementations never fail outward: anything
/// unreadable counts as "nothing saved".
pub trait ModeStore: Send + Sync {
    fn get(&self, mode: Mode) -> Option<String>;
    fn set(&mut self, mode: Mode, text: &str);
}

#[derive(Debug, Default)]
pub struct MemoryModeStore {
    documents: HashMap<Mode, String>,
}

impl MemoryModeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeStore for MemoryModeStore {
    fn get(&self, mode: Mode) -> Option<String> {
        self.documents.get(&mode).cloned()
    }

    fn set(&mut self, mode: Mode, text: &str) {
        self.documents.insert(mode, text.to_string());
    }
}

/// One `<mode>.json` file per mode under a directory.
#[derive(Debug, Clone)]
pub struct FileModeStore {
    dir: Utf8PathBuf,
}

impl FileModeStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, mode: Mode) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", mode.as_str()))
    }

    fn read(&self, mode: Mode) -> Result<Option<String>, StoreError> {
        let path = self.path(mode);
        match std::fs::read_to_string(path.as_std_path()) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn write(&self, mode: Mode, text: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.dir.as_std_path()).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path(mode);
        std::fs::write(path.as_std_path(), text).map_err(|source| StoreError::Io { path, source })
    }
}

impl ModeStore for FileModeStore {
    fn get(&self, mode: Mode) -> Option<String> {
        self.read(mode).unwrap_or_else(|err| {
            tracing::warn!(%mode, error = %err, "could not read saved document");
            None
        })
    }

    fn set(&mut self, mode: Mode, text: &str) {
        if let Err(err) = self.write(mode, text) {
            tracing::warn!(%mode, error = %err, "could not save document");
        }
    }
}
