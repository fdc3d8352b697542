//! Annotation persistence and the in-progress session journal.
//!
//! Every durable write goes through [`write_atomic`]: the bytes land in a
//! hidden temporary file in the destination directory which is then renamed
//! over the destination, so readers see either the old file or the complete
//! new one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::annotation::{Annotation, AnnotatorId};
use crate::error::JudgingError;
use crate::session::SessionSnapshot;

/// Write `bytes` to `path` atomically.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

/// Outcome of [`AnnotationStore::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// An identical record was already stored.
    Unchanged,
}

/// Durable store of completed annotations keyed by (debate, annotator).
pub trait AnnotationStore: Send + Sync {
    /// Store `record`. Writing the identical record again is a no-op; a
    /// different record under an existing key is refused.
    fn write(&self, record: &Annotation) -> Result<WriteOutcome, JudgingError>;

    fn exists(&self, debate_id: &str, annotator: &AnnotatorId) -> Result<bool, JudgingError>;

    fn load(&self, debate_id: &str, annotator: &AnnotatorId)
    -> Result<Option<Annotation>, JudgingError>;

    /// Debate ids this annotator has completed.
    fn annotated_ids(&self, annotator: &AnnotatorId) -> Result<Vec<String>, JudgingError>;

    /// Debate id → annotators who completed it.
    fn annotators_by_debate(&self) -> Result<BTreeMap<String, Vec<String>>, JudgingError>;
}

/// `{dir}/{debate_id}_{annotator}.json` files.
#[derive(Debug, Clone)]
pub struct FileAnnotationStore {
    dir: PathBuf,
}

impl FileAnnotationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, debate_id: &str, annotator: &AnnotatorId) -> PathBuf {
        self.dir.join(format!("{debate_id}_{annotator}.json"))
    }

    fn json_stems(&self) -> Result<Vec<String>, JudgingError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut stems = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_json = path.extension().is_some_and(|e| e == "json");
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if is_json && !hidden {
                if let Some(stem) = path.file_stem() {
                    stems.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        stems.sort();
        Ok(stems)
    }
}

impl AnnotationStore for FileAnnotationStore {
    fn write(&self, record: &Annotation) -> Result<WriteOutcome, JudgingError> {
        let key = format!("{}_{}", record.debate_id, record.annotator_id);
        let path = self.path_for(&record.debate_id, &record.annotator_id);
        if path.is_file() {
            // Records this store cannot parse still occupy the key.
            let content = fs::read_to_string(&path)?;
            let stored: Option<Annotation> = serde_json::from_str(&content).ok();
            if stored.as_ref() == Some(record) {
                debug!(key = %key, "Annotation already stored");
                return Ok(WriteOutcome::Unchanged);
            }
            return Err(JudgingError::AnnotationConflict { key });
        }

        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &json).map_err(|e| JudgingError::PersistenceError {
            key,
            reason: e.to_string(),
        })?;

        info!(path = %path.display(), "Saved annotation");
        Ok(WriteOutcome::Written)
    }

    fn exists(&self, debate_id: &str, annotator: &AnnotatorId) -> Result<bool, JudgingError> {
        Ok(self.path_for(debate_id, annotator).is_file())
    }

    fn load(
        &self,
        debate_id: &str,
        annotator: &AnnotatorId,
    ) -> Result<Option<Annotation>, JudgingError> {
        let path = self.path_for(debate_id, annotator);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn annotated_ids(&self, annotator: &AnnotatorId) -> Result<Vec<String>, JudgingError> {
        let suffix = format!("_{annotator}");
        Ok(self
            .json_stems()?
            .into_iter()
            .filter_map(|stem| stem.strip_suffix(&suffix).map(str::to_string))
            .filter(|id| !id.is_empty())
            .collect())
    }

    fn annotators_by_debate(&self) -> Result<BTreeMap<String, Vec<String>>, JudgingError> {
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for stem in self.json_stems()? {
            if let Some((debate_id, annotator)) = stem.rsplit_once('_') {
                index
                    .entry(debate_id.to_string())
                    .or_default()
                    .push(annotator.to_string());
            }
        }
        Ok(index)
    }
}

/// Durable record of the session an annotator is in the middle of.
pub trait SessionJournal: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), JudgingError>;

    fn load(&self, annotator: &AnnotatorId) -> Result<Option<SessionSnapshot>, JudgingError>;

    fn clear(&self, annotator: &AnnotatorId) -> Result<(), JudgingError>;
}

/// `{dir}/{annotator}.json` snapshots.
#[derive(Debug, Clone)]
pub struct FileSessionJournal {
    dir: PathBuf,
}

impl FileSessionJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, annotator: &AnnotatorId) -> PathBuf {
        self.dir.join(format!("{annotator}.json"))
    }
}

impl SessionJournal for FileSessionJournal {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), JudgingError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path_for(&snapshot.annotator_id), &json)?;
        Ok(())
    }

    fn load(&self, annotator: &AnnotatorId) -> Result<Option<SessionSnapshot>, JudgingError> {
        let path = self.path_for(annotator);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable session journal");
                Ok(None)
            }
        }
    }

    fn clear(&self, annotator: &AnnotatorId) -> Result<(), JudgingError> {
        match fs::remove_file(self.path_for(annotator)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
