//! Read access to generated debates.
//!
//! Debates are stored as `{dir}/{debate_id}.json`. The evaluation-control
//! block is parsed here, checked, and dropped: [`DebateStore::load_debate`]
//! only ever returns a [`DebateView`].

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::annotation::AnnotatorId;
use crate::debate::{
    DebateCategory, DebateView, Side, TURN_COUNT, Turn, TurnRole, role_at, side_at,
};
use crate::error::JudgingError;
use crate::persistence::AnnotationStore;

/// Source of debates for annotation.
pub trait DebateStore: Send + Sync {
    /// Ids of all debates, in selection order.
    fn list_debate_ids(&self) -> Result<Vec<String>, JudgingError>;

    /// Ids of debates this annotator has not completed, in selection order.
    fn list_undone_debate_ids(&self, annotator: &AnnotatorId) -> Result<Vec<String>, JudgingError>;

    /// Load the annotation-facing projection of a debate.
    fn load_debate(&self, id: &str) -> Result<DebateView, JudgingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WeaknessType {
    WeakEvidence,
    ArgumentDropping,
    LogicalGaps,
    BurdenOfProof,
    SideConcession,
}

#[derive(Debug, Default, Deserialize)]
struct ControlBlock {
    #[serde(rename = "type", default)]
    weakness: Option<WeaknessType>,
    #[serde(default)]
    target_side: Option<Side>,
}

#[derive(Debug, Deserialize)]
struct StoredMetadata {
    resolution: String,
    category: DebateCategory,
    #[serde(default)]
    constraint: ControlBlock,
    #[serde(default)]
    is_control: bool,
}

#[derive(Debug, Deserialize)]
struct StoredTurn {
    speaker: Side,
    role: TurnRole,
    text: String,
}

/// Debate file as written by the generator.
#[derive(Debug, Deserialize)]
struct StoredDebate {
    metadata: StoredMetadata,
    turns: Vec<StoredTurn>,
}

impl StoredDebate {
    fn into_view(self, id: &str) -> Result<DebateView, JudgingError> {
        let malformed = |reason: String| JudgingError::MalformedDebate {
            id: id.to_string(),
            reason,
        };

        if self.turns.len() != TURN_COUNT {
            return Err(malformed(format!(
                "expected {} turns, got {}",
                TURN_COUNT,
                self.turns.len()
            )));
        }

        let control = &self.metadata.constraint;
        let injected = control.weakness.is_some() || control.target_side.is_some();
        if self.metadata.is_control == injected {
            return Err(malformed("inconsistent evaluation-control block".to_string()));
        }

        let mut turns = Vec::with_capacity(TURN_COUNT);
        for (position, turn) in self.turns.into_iter().enumerate() {
            if turn.speaker != side_at(position) || Some(turn.role) != role_at(position) {
                return Err(malformed(format!(
                    "turn {} must be {} {}",
                    position,
                    side_at(position),
                    role_at(position).map(TurnRole::as_str).unwrap_or("?")
                )));
            }
            turns.push(Turn::new(position, turn.text));
        }

        Ok(DebateView::new(
            id.to_string(),
            self.metadata.resolution,
            self.metadata.category,
            turns,
        ))
    }
}

/// Debates on disk, with completion tracked by an [`AnnotationStore`].
pub struct FileDebateStore {
    dir: PathBuf,
    annotations: Arc<dyn AnnotationStore>,
}

impl FileDebateStore {
    pub fn new(dir: impl Into<PathBuf>, annotations: Arc<dyn AnnotationStore>) -> Self {
        Self {
            dir: dir.into(),
            annotations,
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, JudgingError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(JudgingError::DebateNotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl DebateStore for FileDebateStore {
    fn list_debate_ids(&self) -> Result<Vec<String>, JudgingError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) {
                    if !stem.starts_with('.') {
                        ids.push(stem);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn list_undone_debate_ids(&self, annotator: &AnnotatorId) -> Result<Vec<String>, JudgingError> {
        let done = self.annotations.annotated_ids(annotator)?;
        Ok(self
            .list_debate_ids()?
            .into_iter()
            .filter(|id| !done.contains(id))
            .collect())
    }

    fn load_debate(&self, id: &str) -> Result<DebateView, JudgingError> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(JudgingError::DebateNotFound(id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        let stored: StoredDebate =
            serde_json::from_str(&content).map_err(|e| JudgingError::MalformedDebate {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        stored.into_view(id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persistence::FileAnnotationStore;
    use serde_json::json;
    use std::path::Path;

    /// Write a debate file in the generator's format.
    pub(crate) fn write_debate(dir: &Path, id: &str, weakness: Option<&str>) {
        let turns = [
            ("aff", "opening", "Aff opening speech."),
            ("neg", "response", "Neg response speech."),
            ("aff", "rebuttal", "Aff rebuttal speech."),
            ("neg", "closing", "Neg closing speech."),
        ];
        let debate = json!({
            "metadata": {
                "debate_id": id,
                "resolution": "This house would ban private car ownership in city centers",
                "category": "policy",
                "aff_model": {"provider": "anthropic", "model_name": "claude", "temperature": 0.7},
                "neg_model": {"provider": "anthropic", "model_name": "claude", "temperature": 0.7},
                "constraint": {
                    "type": weakness,
                    "target_side": weakness.map(|_| "neg"),
                },
                "is_control": weakness.is_none(),
                "generated_at": "2026-02-01T10:00:00Z",
                "generator_version": "0.1.0",
            },
            "turns": turns
                .iter()
                .map(|(speaker, role, text)| {
                    json!({"speaker": speaker, "role": role, "text": text})
                })
                .collect::<Vec<_>>(),
        });
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{id}.json")), debate.to_string()).unwrap();
    }

    fn store(dir: &Path) -> FileDebateStore {
        let annotations = Arc::new(FileAnnotationStore::new(dir.join("annotations")));
        FileDebateStore::new(dir.join("debates"), annotations)
    }

    #[test]
    fn test_load_debate_projection() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", Some("logical_gaps"));

        let view = store(dir.path()).load_debate("d001").unwrap();
        assert_eq!(view.id(), "d001");
        assert_eq!(view.category(), DebateCategory::Policy);
        assert_eq!(view.turns().len(), 4);
        assert_eq!(view.turns()[3].text(), "Neg closing speech.");
        let rendered = format!("{view:?}");
        assert!(!rendered.contains("logical_gaps"));
    }

    #[test]
    fn test_list_undone_excludes_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        for id in ["d003", "d001", "d002"] {
            write_debate(&debates, id, None);
        }
        fs::create_dir_all(dir.path().join("annotations")).unwrap();
        fs::write(dir.path().join("annotations/d001_SP.json"), "{}").unwrap();

        let store = store(dir.path());
        let sp = AnnotatorId::new("SP").unwrap();
        let jc = AnnotatorId::new("JC").unwrap();
        assert_eq!(store.list_debate_ids().unwrap(), vec!["d001", "d002", "d003"]);
        assert_eq!(store.list_undone_debate_ids(&sp).unwrap(), vec!["d002", "d003"]);
        assert_eq!(store.list_undone_debate_ids(&jc).unwrap().len(), 3);
    }

    #[test]
    fn test_wrong_turn_count_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        fs::create_dir_all(&debates).unwrap();
        let debate = json!({
            "metadata": {
                "resolution": "R",
                "category": "values",
                "constraint": {},
                "is_control": true,
            },
            "turns": [{"speaker": "aff", "role": "opening", "text": "only one"}],
        });
        fs::write(debates.join("short.json"), debate.to_string()).unwrap();

        let err = store(dir.path()).load_debate("short").unwrap_err();
        assert!(matches!(err, JudgingError::MalformedDebate { .. }));
    }

    #[test]
    fn test_out_of_pattern_speaker_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        write_debate(&debates, "swap", None);
        let path = debates.join("swap.json");
        let content = fs::read_to_string(&path)
            .unwrap()
            .replacen("\"speaker\":\"aff\"", "\"speaker\":\"neg\"", 1);
        fs::write(&path, content).unwrap();

        let err = store(dir.path()).load_debate("swap").unwrap_err();
        assert!(matches!(err, JudgingError::MalformedDebate { .. }));
    }

    #[test]
    fn test_path_like_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.load_debate("../secrets"),
            Err(JudgingError::DebateNotFound(_))
        ));
        assert!(matches!(
            store.load_debate("missing"),
            Err(JudgingError::DebateNotFound(_))
        ));
    }
}
