//! Judging service.
//!
//! Wires the debate store, annotation store, session journal and optional
//! audio preparer around [`JudgingSession`], and executes the effects each
//! transition requests.

use chrono::Utc;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::annotation::AnnotatorId;
use crate::command::{Action, Command};
use crate::config::Config;
use crate::error::JudgingError;
use crate::persistence::{
    AnnotationStore, FileAnnotationStore, FileSessionJournal, SessionJournal, WriteOutcome,
};
use crate::session::{Effect, Event, JudgingSession, SessionState};
use crate::store::{DebateStore, FileDebateStore};
use crate::tts::{AudioPreparer, PreparedAudio};

/// What the transport should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Render the session's current prompt.
    Continue,
    /// Start the next debate with [`JudgingService::next_debate`].
    NextDebate,
    /// The annotator is done for now.
    Finish,
}

pub struct JudgingService {
    debates: Arc<dyn DebateStore>,
    annotations: Arc<dyn AnnotationStore>,
    journal: Arc<dyn SessionJournal>,
    audio: Option<AudioPreparer>,
}

impl JudgingService {
    pub fn new(
        debates: Arc<dyn DebateStore>,
        annotations: Arc<dyn AnnotationStore>,
        journal: Arc<dyn SessionJournal>,
    ) -> Self {
        Self {
            debates,
            annotations,
            journal,
            audio: None,
        }
    }

    /// File-backed stores under the configured directories, without audio.
    pub fn from_config(config: &Config) -> Self {
        let annotations: Arc<dyn AnnotationStore> =
            Arc::new(FileAnnotationStore::new(&config.paths.annotations_dir));
        let debates = Arc::new(FileDebateStore::new(
            &config.paths.debates_dir,
            annotations.clone(),
        ));
        let journal = Arc::new(FileSessionJournal::new(&config.paths.sessions_dir));
        Self::new(debates, annotations, journal)
    }

    pub fn with_audio(mut self, preparer: AudioPreparer) -> Self {
        self.audio = Some(preparer);
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Open a session on the next debate this annotator has not judged.
    ///
    /// A journaled session is resumed instead, so two transports for one
    /// annotator never replace each other's debate.
    pub fn select_next_debate(
        &self,
        annotator: &AnnotatorId,
    ) -> Result<JudgingSession, JudgingError> {
        if let Some(session) = self.resume(annotator)? {
            return Ok(session);
        }
        self.open_session(annotator, VecDeque::new())
    }

    /// Open a session on the first not-yet-judged debate of `ids`, keeping
    /// the rest queued. A journaled session is resumed instead, with its own
    /// queue.
    pub fn start_batch(
        &self,
        annotator: &AnnotatorId,
        ids: Vec<String>,
    ) -> Result<JudgingSession, JudgingError> {
        if let Some(session) = self.resume(annotator)? {
            return Ok(session);
        }
        self.open_session(annotator, ids.into())
    }

    /// Open the session that follows a finished one, carrying its queue.
    pub fn next_debate(&self, previous: JudgingSession) -> Result<JudgingSession, JudgingError> {
        if !previous.state().is_terminal() {
            return Err(JudgingError::invalid_state(
                previous.state(),
                "move to the next debate",
            ));
        }
        let annotator = previous.annotator().clone();
        self.open_session(&annotator, previous.into_queue())
    }

    fn open_session(
        &self,
        annotator: &AnnotatorId,
        mut queue: VecDeque<String>,
    ) -> Result<JudgingSession, JudgingError> {
        while let Some(id) = queue.pop_front() {
            if self.annotations.exists(&id, annotator)? {
                debug!(debate_id = %id, annotator = %annotator, "Skipping judged debate in batch");
                continue;
            }
            return self.begin(annotator, &id, queue);
        }

        let id = self
            .debates
            .list_undone_debate_ids(annotator)?
            .into_iter()
            .next()
            .ok_or_else(|| JudgingError::NoDebatesRemaining {
                annotator: annotator.to_string(),
            })?;
        self.begin(annotator, &id, queue)
    }

    fn begin(
        &self,
        annotator: &AnnotatorId,
        debate_id: &str,
        queue: VecDeque<String>,
    ) -> Result<JudgingSession, JudgingError> {
        let debate = self.debates.load_debate(debate_id)?;
        let mut session = JudgingSession::new(debate, annotator.clone(), queue);
        self.handle(&mut session, Event::DebateSelected)?;
        info!(debate_id, annotator = %annotator, "Opened judging session");
        Ok(session)
    }

    /// Synthesize and stitch the debate audio, then move to the first
    /// scoring slot. On failure the session is left in `AudioPending`.
    pub async fn prepare_audio(
        &self,
        session: &mut JudgingSession,
    ) -> Result<PreparedAudio, JudgingError> {
        if session.state() != SessionState::AudioPending {
            return Err(JudgingError::invalid_state(session.state(), "prepare audio"));
        }
        let preparer = self.audio.as_ref().ok_or_else(|| {
            JudgingError::SynthesisUnavailable("audio is disabled".to_string())
        })?;

        let prepared = preparer.prepare(session.debate()).await?;
        self.handle(session, Event::AudioReady)?;
        Ok(prepared)
    }

    /// Path of the debate's already stitched audio, without synthesizing.
    pub fn stitched_audio(&self, debate_id: &str) -> Option<PathBuf> {
        self.audio.as_ref()?.stitched_path(debate_id)
    }

    /// Continue text-only.
    pub fn skip_audio(&self, session: &mut JudgingSession) -> Result<(), JudgingError> {
        self.handle(session, Event::SkipAudio)
    }

    /// Apply one event and run its effects.
    ///
    /// The session is updated before effects run. A failed checkpoint is
    /// logged and ignored; a failed persist is returned and leaves the
    /// session complete so [`JudgingService::persist`] can retry.
    pub fn handle(&self, session: &mut JudgingSession, event: Event) -> Result<(), JudgingError> {
        let effects = session.apply(event, Utc::now())?;
        for effect in effects {
            self.execute(effect)?;
        }
        Ok(())
    }

    fn execute(&self, effect: Effect) -> Result<(), JudgingError> {
        match effect {
            Effect::Checkpoint(snapshot) => {
                if let Err(e) = self.journal.save(&snapshot) {
                    warn!(
                        annotator = %snapshot.annotator_id,
                        error = %e,
                        "Could not journal session"
                    );
                }
            }
            Effect::Persist(annotation) => {
                self.annotations.write(&annotation)?;
            }
            Effect::ClearCheckpoint(annotator) => self.clear_journal(&annotator),
        }
        Ok(())
    }

    fn clear_journal(&self, annotator: &AnnotatorId) {
        if let Err(e) = self.journal.clear(annotator) {
            warn!(annotator = %annotator, error = %e, "Could not clear session journal");
        }
    }

    /// Decode-and-apply for a button tap.
    pub fn handle_command(
        &self,
        session: &mut JudgingSession,
        command: Command,
    ) -> Result<Flow, JudgingError> {
        if command.debate_id() != session.debate().id() {
            return Err(JudgingError::WrongDebate {
                expected: session.debate().id().to_string(),
                got: command.debate_id().to_string(),
            });
        }

        match command {
            Command::Score {
                dimension,
                side,
                value,
                ..
            } => self.handle(
                session,
                Event::Score {
                    dimension,
                    side,
                    value,
                },
            )?,
            Command::Winner { side, .. } => self.handle(session, Event::Winner(side))?,
            Command::Action { action, .. } => match (action, session.state()) {
                (Action::Ready, SessionState::AudioPending) => self.skip_audio(session)?,
                (Action::Ready, SessionState::Scoring(_)) => {}
                (Action::Skip, _) => self.handle(session, Event::Justification(None))?,
                (Action::Next, SessionState::Complete) => return Ok(Flow::NextDebate),
                (Action::Done, SessionState::Complete) => return Ok(Flow::Finish),
                (action, state) => {
                    return Err(JudgingError::invalid_state(state, action.as_str()));
                }
            },
        }
        Ok(Flow::Continue)
    }

    /// Free-text justification reply.
    pub fn justify(&self, session: &mut JudgingSession, text: &str) -> Result<(), JudgingError> {
        self.handle(session, Event::Justification(Some(text.to_string())))
    }

    /// Write a completed session's annotation. Safe to call repeatedly.
    pub fn persist(&self, session: &JudgingSession) -> Result<WriteOutcome, JudgingError> {
        let annotation = session
            .annotation()
            .ok_or_else(|| JudgingError::invalid_state(session.state(), "persist"))?;
        let outcome = self.annotations.write(&annotation)?;
        self.clear_journal(session.annotator());
        Ok(outcome)
    }

    /// Abandon the session. Nothing is written.
    pub fn cancel(&self, session: &mut JudgingSession) -> Result<(), JudgingError> {
        self.handle(session, Event::Cancel)
    }

    /// Reopen the annotator's journaled session, if any.
    ///
    /// A journal for a debate that already has a stored record is discarded,
    /// whatever its state. Otherwise a complete session is persisted before
    /// it is returned, and a journal that cannot be restored restarts its
    /// debate from the first slot.
    pub fn resume(&self, annotator: &AnnotatorId) -> Result<Option<JudgingSession>, JudgingError> {
        let Some(snapshot) = self.journal.load(annotator)? else {
            return Ok(None);
        };
        let debate_id = snapshot.debate_id.clone();

        // The stored record wins over any journal, complete or not.
        if self.annotations.exists(&debate_id, annotator)? {
            debug!(debate_id = %debate_id, "Journaled debate already judged");
            self.clear_journal(annotator);
            return Ok(None);
        }

        if snapshot.state == SessionState::Complete {
            let debate = self.debates.load_debate(&debate_id)?;
            let session = JudgingSession::from_snapshot(snapshot, debate)?;
            self.persist(&session)?;
            info!(debate_id = %debate_id, annotator = %annotator, "Resumed completed session");
            return Ok(Some(session));
        }

        let debate = self.debates.load_debate(&debate_id)?;
        let queue: VecDeque<String> = snapshot.queue.iter().cloned().collect();
        match JudgingSession::from_snapshot(snapshot, debate.clone()) {
            Ok(session) => {
                info!(
                    debate_id = %debate_id,
                    annotator = %annotator,
                    state = %session.state(),
                    "Resumed session"
                );
                Ok(Some(session))
            }
            Err(e) => {
                warn!(debate_id = %debate_id, error = %e, "Restarting debate from the first slot");
                let mut session = JudgingSession::new(debate, annotator.clone(), queue);
                self.handle(&mut session, Event::DebateSelected)?;
                Ok(Some(session))
            }
        }
    }

    /// (judged, total) debate counts for an annotator.
    pub fn progress(&self, annotator: &AnnotatorId) -> Result<(usize, usize), JudgingError> {
        let total = self.debates.list_debate_ids()?.len();
        let remaining = self.debates.list_undone_debate_ids(annotator)?.len();
        // Separate listings; a debate added in between must not underflow.
        Ok((total.saturating_sub(remaining), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, Dimension, Slot};
    use crate::audio::OutputFormat;
    use crate::config::{AudioConfig, ProviderKind};
    use crate::debate::Side;
    use crate::session::SessionSnapshot;
    use crate::store::tests::write_debate;
    use crate::tts::{FakeProvider, ProviderChain, SegmentCache};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    fn service(root: &Path) -> JudgingService {
        let mut config = crate::config::default_config();
        config.paths.debates_dir = root.join("debates");
        config.paths.annotations_dir = root.join("annotations");
        config.paths.audio_dir = root.join("audio");
        config.paths.sessions_dir = root.join("sessions");
        JudgingService::from_config(&config)
    }

    fn with_fake_audio(service: JudgingService, root: &Path) -> JudgingService {
        let chain = ProviderChain::new(vec![Box::new(FakeProvider::new(
            ProviderKind::OpenAi,
            "s",
            false,
        ))]);
        let audio = AudioConfig {
            gap_seconds: 0.02,
            sample_rate: 100,
            output_format: OutputFormat::Wav,
        };
        service.with_audio(AudioPreparer::new(
            chain,
            SegmentCache::new(root.join("audio")),
            &audio,
        ))
    }

    fn sp() -> AnnotatorId {
        AnnotatorId::new("SP").unwrap()
    }

    /// Clash, burden, rebuttal, extension, adaptation; aff then neg.
    const D001_SCORES: [i64; 10] = [3, 2, 2, 1, 3, 3, 2, 2, 3, 1];

    fn score_all(service: &JudgingService, session: &mut JudgingSession, values: [i64; 10]) {
        for (slot, value) in Slot::presentation_order().zip(values) {
            let data = format!(
                "score:{}:{}:{}:{}",
                session.debate().id(),
                slot.dimension,
                slot.side,
                value
            );
            let flow = service
                .handle_command(session, Command::parse(&data).unwrap())
                .unwrap();
            assert_eq!(flow, Flow::Continue);
        }
    }

    fn stored(root: &Path, debate_id: &str, annotator: &str) -> Annotation {
        let path = root.join("annotations").join(format!("{debate_id}_{annotator}.json"));
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_d001() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", Some("weak_evidence"));
        let service = with_fake_audio(service(dir.path()), dir.path());

        let mut session = service.select_next_debate(&sp()).unwrap();
        assert_eq!(session.state(), SessionState::AudioPending);
        assert_eq!(session.debate().id(), "d001");

        assert_eq!(service.stitched_audio("d001"), None);
        let prepared = service.prepare_audio(&mut session).await.unwrap();
        assert!(prepared.path.is_file());
        assert_eq!(service.stitched_audio("d001"), Some(prepared.path.clone()));
        assert_eq!(
            session.state(),
            SessionState::Scoring(Slot::new(Dimension::Clash, Side::Aff))
        );

        score_all(&service, &mut session, D001_SCORES);
        service
            .handle_command(&mut session, Command::parse("winner:d001:aff").unwrap())
            .unwrap();
        service
            .handle_command(&mut session, Command::parse("action:d001:skip").unwrap())
            .unwrap();
        assert_eq!(session.state(), SessionState::Complete);

        let record = stored(dir.path(), "d001", "SP");
        assert_eq!(record.winner, Side::Aff);
        assert_eq!(record.justification, None);
        assert!(record.provenance.audio_used);
        for (slot, value) in Slot::presentation_order().zip(D001_SCORES) {
            assert_eq!(i64::from(record.score(slot).unwrap().value()), value);
        }

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("annotations/d001_SP.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["winner"], "aff");
        assert!(json["justification"].is_null());
        assert_eq!(json["scores"]["burden"]["neg"], 1);

        assert!(!dir.path().join("sessions/SP.json").exists());
        assert_eq!(service.progress(&sp()).unwrap(), (1, 1));
        assert_eq!(
            service
                .handle_command(&mut session, Command::parse("action:d001:next").unwrap())
                .unwrap(),
            Flow::NextDebate
        );
        assert!(matches!(
            service.next_debate(session),
            Err(JudgingError::NoDebatesRemaining { .. })
        ));
    }

    #[tokio::test]
    async fn test_control_block_never_reaches_annotator_outputs() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d007", Some("argument_dropping"));
        let service = with_fake_audio(service(dir.path()), dir.path());

        let mut session = service.select_next_debate(&sp()).unwrap();
        let mut rendered = vec![session.prompt().text, session.debate().transcript()];
        service.prepare_audio(&mut session).await.unwrap();
        for slot in Slot::presentation_order() {
            rendered.push(session.prompt().text);
            rendered.extend(session.prompt().buttons.into_iter().map(|b| b.data));
            service
                .handle(
                    &mut session,
                    Event::Score {
                        dimension: slot.dimension,
                        side: slot.side,
                        value: 2,
                    },
                )
                .unwrap();
        }
        service.handle(&mut session, Event::Winner(Side::Neg)).unwrap();
        service.justify(&mut session, "Close round.").unwrap();
        rendered.push(session.prompt().text);
        rendered.push(format!("{:?}", session.debate()));
        rendered.push(
            fs::read_to_string(dir.path().join("audio/d007/manifest.json")).unwrap(),
        );
        rendered.push(fs::read_to_string(dir.path().join("annotations/d007_SP.json")).unwrap());

        for text in rendered {
            for leaked in ["argument_dropping", "target_side", "is_control", "constraint"] {
                assert!(!text.contains(leaked), "found '{leaked}' in: {text}");
            }
        }
    }

    #[test]
    fn test_persist_twice_keeps_one_record() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", None);
        let service = service(dir.path());

        let mut session = service.select_next_debate(&sp()).unwrap();
        service.skip_audio(&mut session).unwrap();
        score_all(&service, &mut session, [2; 10]);
        service.handle(&mut session, Event::Winner(Side::Aff)).unwrap();
        service.justify(&mut session, "").unwrap();

        let first = fs::read_to_string(dir.path().join("annotations/d001_SP.json")).unwrap();
        assert_eq!(service.persist(&session).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(service.persist(&session).unwrap(), WriteOutcome::Unchanged);
        let second = fs::read_to_string(dir.path().join("annotations/d001_SP.json")).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(dir.path().join("annotations")).unwrap().count(), 1);
        assert!(!stored(dir.path(), "d001", "SP").provenance.audio_used);
    }

    /// Annotation store whose writes fail until `healthy` is set.
    struct FlakyStore {
        inner: FileAnnotationStore,
        healthy: Mutex<bool>,
    }

    impl AnnotationStore for FlakyStore {
        fn write(&self, record: &Annotation) -> Result<WriteOutcome, JudgingError> {
            if !*self.healthy.lock().unwrap() {
                return Err(JudgingError::PersistenceError {
                    key: record.debate_id.clone(),
                    reason: "disk full".to_string(),
                });
            }
            self.inner.write(record)
        }

        fn exists(&self, debate_id: &str, annotator: &AnnotatorId) -> Result<bool, JudgingError> {
            self.inner.exists(debate_id, annotator)
        }

        fn load(
            &self,
            debate_id: &str,
            annotator: &AnnotatorId,
        ) -> Result<Option<Annotation>, JudgingError> {
            self.inner.load(debate_id, annotator)
        }

        fn annotated_ids(&self, annotator: &AnnotatorId) -> Result<Vec<String>, JudgingError> {
            self.inner.annotated_ids(annotator)
        }

        fn annotators_by_debate(
            &self,
        ) -> Result<std::collections::BTreeMap<String, Vec<String>>, JudgingError> {
            self.inner.annotators_by_debate()
        }
    }

    #[test]
    fn test_persistence_error_is_retryable_without_rescoring() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", None);
        let flaky = Arc::new(FlakyStore {
            inner: FileAnnotationStore::new(dir.path().join("annotations")),
            healthy: Mutex::new(false),
        });
        let journal = Arc::new(FileSessionJournal::new(dir.path().join("sessions")));
        let debates = Arc::new(FileDebateStore::new(dir.path().join("debates"), flaky.clone()));
        let service = JudgingService::new(debates, flaky.clone(), journal.clone());

        let mut session = service.select_next_debate(&sp()).unwrap();
        service.skip_audio(&mut session).unwrap();
        score_all(&service, &mut session, D001_SCORES);
        service.handle(&mut session, Event::Winner(Side::Aff)).unwrap();

        let err = service.handle(&mut session, Event::Justification(None)).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::Complete);
        assert!(journal.load(&sp()).unwrap().is_some());

        *flaky.healthy.lock().unwrap() = true;
        assert_eq!(service.persist(&session).unwrap(), WriteOutcome::Written);
        assert!(journal.load(&sp()).unwrap().is_none());
        assert_eq!(stored(dir.path(), "d001", "SP").winner, Side::Aff);
    }

    /// A complete session whose record never reached disk, journal intact.
    fn stranded_complete_session(root: &Path) -> JudgingSession {
        write_debate(&root.join("debates"), "d001", None);
        let flaky = Arc::new(FlakyStore {
            inner: FileAnnotationStore::new(root.join("annotations")),
            healthy: Mutex::new(false),
        });
        let journal = Arc::new(FileSessionJournal::new(root.join("sessions")));
        let debates = Arc::new(FileDebateStore::new(root.join("debates"), flaky.clone()));
        let service = JudgingService::new(debates, flaky, journal);

        let mut session = service.select_next_debate(&sp()).unwrap();
        service.skip_audio(&mut session).unwrap();
        score_all(&service, &mut session, D001_SCORES);
        service.handle(&mut session, Event::Winner(Side::Aff)).unwrap();
        service.justify(&mut session, "Cleaner rebuttals.").unwrap_err();
        assert!(root.join("sessions/SP.json").is_file());
        session
    }

    #[test]
    fn test_resume_defers_to_divergent_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let session = stranded_complete_session(dir.path());

        // Another transport stored a different verdict for the same key.
        let mut other = session.annotation().unwrap();
        other.justification = Some("Judged on the phone.".to_string());
        FileAnnotationStore::new(dir.path().join("annotations"))
            .write(&other)
            .unwrap();

        let service = service(dir.path());
        let err = service.persist(&session).unwrap_err();
        assert!(matches!(err, JudgingError::AnnotationConflict { .. }));
        assert!(!err.is_retryable());

        for _ in 0..3 {
            assert!(service.resume(&sp()).unwrap().is_none());
        }
        assert!(!dir.path().join("sessions/SP.json").exists());
        assert_eq!(stored(dir.path(), "d001", "SP"), other);
        assert!(matches!(
            service.select_next_debate(&sp()),
            Err(JudgingError::NoDebatesRemaining { .. })
        ));
    }

    #[test]
    fn test_resume_defers_to_foreign_format_record() {
        let dir = tempfile::tempdir().unwrap();
        stranded_complete_session(dir.path());
        let legacy = r#"{"debate_id": "d001", "annotator": "SP", "winner": "neg"}"#;
        fs::create_dir_all(dir.path().join("annotations")).unwrap();
        fs::write(dir.path().join("annotations/d001_SP.json"), legacy).unwrap();

        let service = service(dir.path());
        assert!(service.resume(&sp()).unwrap().is_none());
        assert!(!dir.path().join("sessions/SP.json").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("annotations/d001_SP.json")).unwrap(),
            legacy
        );
    }

    #[test]
    fn test_second_transport_picks_up_journaled_debate() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        write_debate(&debates, "d001", None);
        write_debate(&debates, "d002", None);

        let first = service(dir.path());
        let mut session = first.select_next_debate(&sp()).unwrap();
        first.skip_audio(&mut session).unwrap();
        score_all(&first, &mut session, D001_SCORES);

        let second = service(dir.path());
        let picked = second.select_next_debate(&sp()).unwrap();
        assert_eq!(picked.debate().id(), "d001");
        assert_eq!(picked.state(), SessionState::AwaitingWinner);

        let batch = second.start_batch(&sp(), vec!["d002".into()]).unwrap();
        assert_eq!(batch.debate().id(), "d001");
        assert_eq!(batch.scored_count(), Slot::COUNT);
    }

    #[test]
    fn test_resume_restores_cursor_and_skips_finished() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        write_debate(&debates, "d001", None);
        write_debate(&debates, "d002", None);

        let service = service(dir.path());
        let mut session = service.select_next_debate(&sp()).unwrap();
        service.skip_audio(&mut session).unwrap();
        for (slot, value) in Slot::presentation_order().zip(D001_SCORES).take(4) {
            service
                .handle(
                    &mut session,
                    Event::Score {
                        dimension: slot.dimension,
                        side: slot.side,
                        value,
                    },
                )
                .unwrap();
        }
        drop(session);

        // A fresh service over the same directories, as after a restart.
        let service = self::service(dir.path());
        let resumed = service.resume(&sp()).unwrap().unwrap();
        assert_eq!(resumed.debate().id(), "d001");
        assert_eq!(resumed.scored_count(), 4);
        assert_eq!(
            resumed.state(),
            SessionState::Scoring(Slot::new(Dimension::Rebuttal, Side::Aff))
        );

        // Another device finished d001 meanwhile: the journal is dropped.
        fs::create_dir_all(dir.path().join("annotations")).unwrap();
        fs::write(dir.path().join("annotations/d001_SP.json"), "{}").unwrap();
        assert!(service.resume(&sp()).unwrap().is_none());
        assert!(!dir.path().join("sessions/SP.json").exists());
        assert_eq!(service.select_next_debate(&sp()).unwrap().debate().id(), "d002");
    }

    #[test]
    fn test_resume_with_corrupt_cursor_restarts_debate() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", None);
        let journal = FileSessionJournal::new(dir.path().join("sessions"));
        journal
            .save(&SessionSnapshot {
                annotator_id: sp(),
                debate_id: "d001".to_string(),
                state: SessionState::AwaitingWinner,
                scores: Vec::new(),
                winner: None,
                justification: None,
                audio_used: false,
                completed_at: None,
                queue: vec!["d005".to_string()],
            })
            .unwrap();

        let resumed = service(dir.path()).resume(&sp()).unwrap().unwrap();
        assert_eq!(resumed.debate().id(), "d001");
        assert_eq!(resumed.state(), SessionState::AudioPending);
        assert_eq!(resumed.scored_count(), 0);
        assert_eq!(resumed.queue().front().map(String::as_str), Some("d005"));
    }

    #[test]
    fn test_batch_skips_judged_and_carries_queue() {
        let dir = tempfile::tempdir().unwrap();
        let debates = dir.path().join("debates");
        for id in ["d001", "d002", "d003"] {
            write_debate(&debates, id, None);
        }
        let service = service(dir.path());
        fs::create_dir_all(dir.path().join("annotations")).unwrap();
        fs::write(dir.path().join("annotations/d003_SP.json"), "{}").unwrap();

        let mut session = service
            .start_batch(&sp(), vec!["d003".into(), "d002".into(), "d001".into()])
            .unwrap();
        assert_eq!(session.debate().id(), "d002");
        assert_eq!(session.queue().len(), 1);

        assert!(matches!(
            service.next_debate(session.clone()),
            Err(JudgingError::InvalidState { .. })
        ));
        service.cancel(&mut session).unwrap();
        assert!(!dir.path().join("annotations/d002_SP.json").exists());

        let next = service.next_debate(session).unwrap();
        assert_eq!(next.debate().id(), "d001");
        assert!(next.queue().is_empty());
    }

    #[test]
    fn test_commands_for_other_debates_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", None);
        let service = service(dir.path());
        let mut session = service.select_next_debate(&sp()).unwrap();

        let err = service
            .handle_command(&mut session, Command::parse("action:d999:ready").unwrap())
            .unwrap_err();
        assert!(matches!(err, JudgingError::WrongDebate { .. }));
        assert_eq!(session.state(), SessionState::AudioPending);

        service
            .handle_command(&mut session, Command::parse("action:d001:ready").unwrap())
            .unwrap();
        assert!(matches!(session.state(), SessionState::Scoring(_)));
        assert!(!session.audio_used());
    }

    #[tokio::test]
    async fn test_prepare_audio_without_providers_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        write_debate(&dir.path().join("debates"), "d001", None);
        let service = service(dir.path());
        let mut session = service.select_next_debate(&sp()).unwrap();

        let err = service.prepare_audio(&mut session).await.unwrap_err();
        assert!(matches!(err, JudgingError::SynthesisUnavailable(_)));
        assert_eq!(service.stitched_audio("d001"), None);
        assert_eq!(session.state(), SessionState::AudioPending);
    }

    /// A store that gains a debate between its two listings.
    struct GrowingStore;

    impl DebateStore for GrowingStore {
        fn list_debate_ids(&self) -> Result<Vec<String>, JudgingError> {
            Ok(vec!["d001".to_string()])
        }

        fn list_undone_debate_ids(
            &self,
            _annotator: &AnnotatorId,
        ) -> Result<Vec<String>, JudgingError> {
            Ok(vec!["d001".to_string(), "d002".to_string()])
        }

        fn load_debate(&self, id: &str) -> Result<crate::debate::DebateView, JudgingError> {
            Err(JudgingError::DebateNotFound(id.to_string()))
        }
    }

    #[test]
    fn test_progress_tolerates_debates_added_mid_count() {
        let dir = tempfile::tempdir().unwrap();
        let service = JudgingService::new(
            Arc::new(GrowingStore),
            Arc::new(FileAnnotationStore::new(dir.path().join("annotations"))),
            Arc::new(FileSessionJournal::new(dir.path().join("sessions"))),
        );
        assert_eq!(service.progress(&sp()).unwrap(), (0, 1));
    }

    #[test]
    fn test_exhausted_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(matches!(
            service.select_next_debate(&sp()),
            Err(JudgingError::NoDebatesRemaining { .. })
        ));
        assert_eq!(service.progress(&sp()).unwrap(), (0, 0));
    }
}
