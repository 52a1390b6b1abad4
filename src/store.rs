use crate::rule::{Rule, RuleError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

// Single-writer discipline for the rule directory; readers go lock-free
// and retry once on a file that vanishes mid-rename.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Rule '{0}' not found")]
    NotFound(String),

    #[error("Rule id '{0}' already exists")]
    DuplicateId(String),

    #[error(transparent)]
    Invalid(#[from] RuleError),

    #[error("Archive error in '{path}': {source}")]
    Zip {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Outcome of listing the rule directory: well-formed rules plus the
/// files that failed to load, reported separately so one bad file never
/// hides the rest.
#[derive(Debug, Default, Serialize)]
pub struct RuleListing {
    pub rules: Vec<Rule>,
    pub malformed: Vec<MalformedRule>,
}

#[derive(Debug, Serialize)]
pub struct MalformedRule {
    pub file: String,
    pub error: String,
}

/// Batch import accounting: every submitted item lands in exactly one of
/// the three buckets.
#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub success_count: usize,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

/// YAML rule store: one `<id>.yaml` per rule under a configured directory.
pub struct RuleStore {
    dir: PathBuf,
}

impl RuleStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(RuleStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rule_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", id))
    }

    /// All well-formed rules, sorted by title; malformed files reported
    /// alongside.
    pub fn list(&self) -> Result<RuleListing, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut listing = RuleListing::default();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !is_yaml(&path) {
                continue;
            }
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match load_rule_file(&path) {
                Ok(rule) => listing.rules.push(rule),
                Err(StoreError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    // Transient: a concurrent save renamed under us. One retry.
                    match load_rule_file(&path) {
                        Ok(rule) => listing.rules.push(rule),
                        Err(StoreError::Io { source, .. })
                            if source.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => listing.malformed.push(MalformedRule {
                            file,
                            error: err.to_string(),
                        }),
                    }
                }
                Err(err) => listing.malformed.push(MalformedRule {
                    file,
                    error: err.to_string(),
                }),
            }
        }
        listing.rules.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(listing)
    }

    pub fn get(&self, id: &str) -> Result<Rule, StoreError> {
        let path = self.rule_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        load_rule_file(&path)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.rule_path(id).exists()
    }

    /// Create or overwrite. Validates, assigns an id when empty, and
    /// writes atomically (temp file + rename).
    pub fn save(&self, mut rule: Rule) -> Result<Rule, StoreError> {
        rule.ensure_id();
        rule.validate()?;

        let yaml = serde_yaml::to_string(&rule).map_err(|source| StoreError::Yaml {
            path: self.rule_path(&rule.id).display().to_string(),
            source,
        })?;

        let _guard = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.rule_path(&rule.id);
        let temp = self.dir.join(format!(".{}.tmp", rule.id));
        fs::write(&temp, yaml).map_err(|source| StoreError::Io {
            path: temp.display().to_string(),
            source,
        })?;
        fs::rename(&temp, &target).map_err(|source| StoreError::Io {
            path: target.display().to_string(),
            source,
        })?;
        Ok(rule)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.rule_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Write one rule's canonical YAML to `dest`.
    pub fn export_rule(&self, id: &str, dest: &Path) -> Result<(), StoreError> {
        let rule = self.get(id)?;
        let yaml = serde_yaml::to_string(&rule).map_err(|source| StoreError::Yaml {
            path: dest.display().to_string(),
            source,
        })?;
        fs::write(dest, yaml).map_err(|source| StoreError::Io {
            path: dest.display().to_string(),
            source,
        })
    }

    /// Pack every well-formed rule into a ZIP archive. Returns the count.
    pub fn export_all(&self, dest: &Path) -> Result<usize, StoreError> {
        let listing = self.list()?;
        let file = File::create(dest).map_err(|source| StoreError::Io {
            path: dest.display().to_string(),
            source,
        })?;
        let mut archive = ZipWriter::new(file);
        let options = FileOptions::default();
        for rule in &listing.rules {
            let yaml = serde_yaml::to_string(rule).map_err(|source| StoreError::Yaml {
                path: dest.display().to_string(),
                source,
            })?;
            archive
                .start_file(format!("{}.yaml", rule.id), options)
                .map_err(|source| StoreError::Zip {
                    path: dest.display().to_string(),
                    source,
                })?;
            archive
                .write_all(yaml.as_bytes())
                .map_err(|source| StoreError::Io {
                    path: dest.display().to_string(),
                    source,
                })?;
        }
        archive.finish().map_err(|source| StoreError::Zip {
            path: dest.display().to_string(),
            source,
        })?;
        Ok(listing.rules.len())
    }

    /// Import a single rule file. `overwrite=false` turns an existing id
    /// into [`StoreError::DuplicateId`].
    pub fn import_file(&self, source: &Path, overwrite: bool) -> Result<Rule, StoreError> {
        let text = fs::read_to_string(source).map_err(|err| StoreError::Io {
            path: source.display().to_string(),
            source: err,
        })?;
        self.import_text(&source.display().to_string(), &text, overwrite)
    }

    fn import_text(&self, name: &str, text: &str, overwrite: bool) -> Result<Rule, StoreError> {
        let mut rule: Rule = serde_yaml::from_str(text).map_err(|source| StoreError::Yaml {
            path: name.to_string(),
            source,
        })?;
        rule.ensure_id();
        rule.validate()?;
        if !overwrite && self.exists(&rule.id) {
            return Err(StoreError::DuplicateId(rule.id));
        }
        self.save(rule)
    }

    /// Import a batch of files. Per-file failures never abort the batch.
    pub fn import_files(&self, sources: &[PathBuf], overwrite: bool) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for source in sources {
            let name = file_label(source);
            match self.import_file(source, overwrite) {
                Ok(_) => summary.success_count += 1,
                Err(StoreError::DuplicateId(_)) => summary.skipped.push(name),
                Err(err) => summary.errors.push(format!("{}: {}", name, err)),
            }
        }
        summary
    }

    /// Expand a ZIP archive and run every file entry through the import
    /// pipeline.
    pub fn import_zip(&self, zip_path: &Path, overwrite: bool) -> Result<ImportSummary, StoreError> {
        let file = File::open(zip_path).map_err(|source| StoreError::Io {
            path: zip_path.display().to_string(),
            source,
        })?;
        let mut archive = ZipArchive::new(file).map_err(|source| StoreError::Zip {
            path: zip_path.display().to_string(),
            source,
        })?;

        let mut summary = ImportSummary::default();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|source| StoreError::Zip {
                path: zip_path.display().to_string(),
                source,
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut text = String::new();
            if let Err(err) = entry.read_to_string(&mut text) {
                summary.errors.push(format!("{}: {}", name, err));
                continue;
            }
            match self.import_text(&name, &text, overwrite) {
                Ok(_) => summary.success_count += 1,
                Err(StoreError::DuplicateId(_)) => summary.skipped.push(name),
                Err(err) => summary.errors.push(format!("{}: {}", name, err)),
            }
        }
        Ok(summary)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_rule_file(path: &Path) -> Result<Rule, StoreError> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let rule: Rule = serde_yaml::from_str(&text).map_err(|source| StoreError::Yaml {
        path: path.display().to_string(),
        source,
    })?;
    rule.validate()?;
    Ok(rule)
}
