use crate::ingest::LogFormat;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse log metadata '{path}': {source}")]
    Metadata {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Log file '{0}' is not in the library")]
    NotFound(String),

    #[error("Log file '{0}' already exists in the library")]
    Duplicate(String),
}

/// One imported log file as the shell sees it.
#[derive(Debug, Clone, Serialize)]
pub struct LogFileInfo {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_type: Option<LogFormat>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
}

/// The managed `logs/` directory plus its `metadata.json` sidecar mapping
/// filename → declared log format. Files without an entry are "unknown"
/// and need an explicit format at scan time.
pub struct LogLibrary {
    dir: PathBuf,
}

impl LogLibrary {
    pub fn open(dir: &Path) -> Result<Self, LibraryError> {
        fs::create_dir_all(dir).map_err(|source| LibraryError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(LogLibrary {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Read the sidecar; a missing file is an empty mapping.
    pub fn metadata(&self) -> Result<BTreeMap<String, LogFormat>, LibraryError> {
        let path = self.metadata_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(LibraryError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| LibraryError::Metadata {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_metadata(&self, metadata: &BTreeMap<String, LogFormat>) -> Result<(), LibraryError> {
        let path = self.metadata_path();
        let temp = self.dir.join(".metadata.json.tmp");
        let text = serde_json::to_string_pretty(metadata).map_err(|source| {
            LibraryError::Metadata {
                path: path.display().to_string(),
                source,
            }
        })?;
        fs::write(&temp, text).map_err(|source| LibraryError::Io {
            path: temp.display().to_string(),
            source,
        })?;
        fs::rename(&temp, &path).map_err(|source| LibraryError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn log_type_of(&self, filename: &str) -> Result<Option<LogFormat>, LibraryError> {
        Ok(self.metadata()?.get(filename).copied())
    }

    /// Every file in the library (sidecar excluded), sorted by name.
    pub fn list(&self) -> Result<Vec<LogFileInfo>, LibraryError> {
        let metadata = self.metadata()?;
        let entries = fs::read_dir(&self.dir).map_err(|source| LibraryError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LibraryError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !path.is_file() || filename == METADATA_FILE || filename.starts_with('.') {
                continue;
            }
            let stat = entry.metadata().map_err(|source| LibraryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            files.push(LogFileInfo {
                log_type: metadata.get(&filename).copied(),
                size_bytes: stat.len(),
                imported_at: stat.modified().ok().map(DateTime::<Utc>::from),
                filename,
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Copy a file into the library (filename preserved) and record its
    /// format in the sidecar.
    pub fn import(&self, source: &Path, log_type: LogFormat) -> Result<LogFileInfo, LibraryError> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LibraryError::NotFound(source.display().to_string()))?;
        let dest = self.path_of(&filename);
        if dest.exists() {
            return Err(LibraryError::Duplicate(filename));
        }
        fs::copy(source, &dest).map_err(|err| LibraryError::Io {
            path: source.display().to_string(),
            source: err,
        })?;

        let mut metadata = self.metadata()?;
        metadata.insert(filename.clone(), log_type);
        self.write_metadata(&metadata)?;

        let stat = fs::metadata(&dest).map_err(|source| LibraryError::Io {
            path: dest.display().to_string(),
            source,
        })?;
        Ok(LogFileInfo {
            filename,
            log_type: Some(log_type),
            size_bytes: stat.len(),
            imported_at: stat.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    pub fn update_log_type(
        &self,
        filename: &str,
        log_type: LogFormat,
    ) -> Result<(), LibraryError> {
        if !self.path_of(filename).exists() {
            return Err(LibraryError::NotFound(filename.to_string()));
        }
        let mut metadata = self.metadata()?;
        metadata.insert(filename.to_string(), log_type);
        self.write_metadata(&metadata)
    }

    pub fn delete(&self, filename: &str) -> Result<(), LibraryError> {
        let path = self.path_of(filename);
        if !path.exists() {
            return Err(LibraryError::NotFound(filename.to_string()));
        }
        fs::remove_file(&path).map_err(|source| LibraryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut metadata = self.metadata()?;
        if metadata.remove(filename).is_some() {
            self.write_metadata(&metadata)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn library() -> (tempfile::TempDir, LogLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let lib = LogLibrary::open(&dir.path().join("logs")).unwrap();
        (dir, lib)
    }

    fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_import_records_log_type() {
        let (dir, lib) = library();
        let source = write_source(dir.path(), "trail.json", r#"{"Records": []}"#);
        let info = lib.import(&source, LogFormat::CloudTrail).unwrap();
        assert_eq!(info.filename, "trail.json");
        assert_eq!(info.log_type, Some(LogFormat::CloudTrail));
        assert_eq!(
            lib.log_type_of("trail.json").unwrap(),
            Some(LogFormat::CloudTrail)
        );
    }

    #[test]
    fn test_import_duplicate_is_rejected() {
        let (dir, lib) = library();
        let source = write_source(dir.path(), "a.json", "{}");
        lib.import(&source, LogFormat::FlatJson).unwrap();
        assert!(matches!(
            lib.import(&source, LogFormat::FlatJson),
            Err(LibraryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_list_excludes_sidecar() {
        let (dir, lib) = library();
        let source = write_source(dir.path(), "a.ndjson", "{\"x\":1}\n");
        lib.import(&source, LogFormat::FlatJson).unwrap();
        let files = lib.list().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.ndjson");
    }

    #[test]
    fn test_delete_removes_file_and_metadata() {
        let (dir, lib) = library();
        let source = write_source(dir.path(), "a.json", "{}");
        lib.import(&source, LogFormat::FlatJson).unwrap();
        lib.delete("a.json").unwrap();
        assert!(lib.list().unwrap().is_empty());
        assert_eq!(lib.log_type_of("a.json").unwrap(), None);
        assert!(matches!(
            lib.delete("a.json"),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_log_type() {
        let (dir, lib) = library();
        let source = write_source(dir.path(), "a.json", "{}");
        lib.import(&source, LogFormat::FlatJson).unwrap();
        lib.update_log_type("a.json", LogFormat::CloudTrail).unwrap();
        assert_eq!(
            lib.log_type_of("a.json").unwrap(),
            Some(LogFormat::CloudTrail)
        );
        assert!(matches!(
            lib.update_log_type("missing.json", LogFormat::FlatJson),
            Err(LibraryError::NotFound(_))
        ));
    }
}
