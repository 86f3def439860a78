//! In-memory services for testing the engine without a backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use readscore_core::error::ServiceError;
use readscore_core::model::{
    AssessmentType, AudioRecording, DdmStimulus, Grade, NarrativeAnalysis, NewSession, Period,
    ScoreEntry, SessionRecord, Story, SubScore,
};
use readscore_core::traits::{
    AnalysisService, PersistenceService, StimulusProvider, StoredScore, TranscriptionOutcome,
    TranscriptionService,
};

/// A service call that [`MockServices`] counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StartSession,
    AddScores,
    EditScore,
    CompleteSession,
    UploadAudio,
    SaveTranscript,
    Transcribe,
    Analyze,
    Stories,
    DdmStimulus,
}

/// Implements every collaborator trait over in-memory state.
pub struct MockServices {
    next_id: AtomicU64,
    calls: Mutex<HashMap<Operation, u32>>,
    failures: Mutex<HashMap<Operation, ServiceError>>,
    sessions: Mutex<Vec<SessionRecord>>,
    scores: Mutex<Vec<(u64, StoredScore)>>,
    completed: Mutex<HashSet<u64>>,
    uploads: Mutex<Vec<(u64, AudioRecording)>>,
    transcripts: Mutex<HashMap<u64, String>>,
    transcription: Mutex<TranscriptionOutcome>,
    analysis: Mutex<NarrativeAnalysis>,
    stories: Vec<Story>,
    stimuli: HashMap<String, DdmStimulus>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            scores: Mutex::new(Vec::new()),
            completed: Mutex::new(HashSet::new()),
            uploads: Mutex::new(Vec::new()),
            transcripts: Mutex::new(HashMap::new()),
            transcription: Mutex::new(TranscriptionOutcome::transcribed(
                "The boy lost his dog. He looked everywhere. Finally he found it.",
            )),
            analysis: Mutex::new(sample_analysis()),
            stories: vec![Story {
                title: "The Lost Dog".into(),
                text: "The boy lost his dog. He looked everywhere. Finally he found it.".into(),
            }],
            stimuli: HashMap::new(),
        }
    }

    pub fn with_transcription(self, outcome: TranscriptionOutcome) -> Self {
        *lock(&self.transcription) = outcome;
        self
    }

    pub fn with_analysis(self, analysis: NarrativeAnalysis) -> Self {
        *lock(&self.analysis) = analysis;
        self
    }

    pub fn with_stories(mut self, stories: Vec<Story>) -> Self {
        self.stories = stories;
        self
    }

    pub fn with_stimulus(mut self, target: &str, stimulus: DdmStimulus) -> Self {
        self.stimuli.insert(target.to_string(), stimulus);
        self
    }

    /// Make every later call of `op` fail with `error`.
    pub fn fail(&self, op: Operation, error: ServiceError) {
        lock(&self.failures).insert(op, error);
    }

    pub fn recover(&self, op: Operation) {
        lock(&self.failures).remove(&op);
    }

    pub fn calls(&self, op: Operation) -> u32 {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Score entries recorded for a session, in arrival order.
    pub fn scores(&self, session_id: u64) -> Vec<ScoreEntry> {
        lock(&self.scores)
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, s)| s.entry.clone())
            .collect()
    }

    pub fn is_complete(&self, session_id: u64) -> bool {
        lock(&self.completed).contains(&session_id)
    }

    pub fn uploads(&self, session_id: u64) -> usize {
        lock(&self.uploads)
            .iter()
            .filter(|(id, _)| *id == session_id)
            .count()
    }

    pub fn saved_transcript(&self, session_id: u64) -> Option<String> {
        lock(&self.transcripts).get(&session_id).cloned()
    }

    fn enter(&self, op: Operation) -> Result<(), ServiceError> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        match lock(&self.failures).get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// A mid-range analysis used unless a test sets its own.
fn sample_analysis() -> NarrativeAnalysis {
    let mut analysis = NarrativeAnalysis {
        word_count: 13,
        sentence_count: 3,
        total_retell_score: 7,
        max_retell_score: 12,
        ..NarrativeAnalysis::default()
    };
    for (key, label, score) in [
        ("EC", "Episode Complexity", 3),
        ("SC", "Sentence Complexity", 0),
        ("VC", "Vocabulary Complexity", 3),
        ("NDC", "Narrative Discourse Complexity", 1),
    ] {
        analysis.sub_scores.insert(
            key.to_string(),
            SubScore {
                label: label.to_string(),
                score,
                max: 3,
                detail: String::new(),
            },
        );
    }
    analysis
}

#[async_trait]
impl PersistenceService for MockServices {
    async fn start_session(&self, session: &NewSession) -> Result<SessionRecord, ServiceError> {
        self.enter(Operation::StartSession)?;
        let record = SessionRecord {
            id: self.next_id(),
            student_id: session.student_id,
            subtest: session.subtest,
            is_complete: false,
        };
        lock(&self.sessions).push(record.clone());
        Ok(record)
    }

    async fn add_scores(
        &self,
        session_id: u64,
        entries: &[ScoreEntry],
    ) -> Result<Vec<StoredScore>, ServiceError> {
        self.enter(Operation::AddScores)?;
        let stored: Vec<StoredScore> = entries
            .iter()
            .map(|entry| StoredScore {
                id: self.next_id(),
                entry: entry.clone(),
            })
            .collect();
        lock(&self.scores).extend(stored.iter().map(|s| (session_id, s.clone())));
        Ok(stored)
    }

    async fn edit_score(
        &self,
        session_id: u64,
        score_id: u64,
        entry: &ScoreEntry,
    ) -> Result<StoredScore, ServiceError> {
        self.enter(Operation::EditScore)?;
        let mut scores = lock(&self.scores);
        let Some((_, stored)) = scores
            .iter_mut()
            .find(|(sid, s)| *sid == session_id && s.id == score_id)
        else {
            return Err(ServiceError::NotFound("Score not found".into()));
        };
        stored.entry.raw_score = entry.raw_score;
        if entry.notes.is_some() {
            stored.entry.notes = entry.notes.clone();
        }
        Ok(stored.clone())
    }

    async fn complete_session(&self, session_id: u64) -> Result<(), ServiceError> {
        self.enter(Operation::CompleteSession)?;
        lock(&self.completed).insert(session_id);
        Ok(())
    }

    async fn upload_audio(
        &self,
        session_id: u64,
        recording: &AudioRecording,
    ) -> Result<(), ServiceError> {
        self.enter(Operation::UploadAudio)?;
        lock(&self.uploads).push((session_id, recording.clone()));
        Ok(())
    }

    async fn save_transcript(&self, session_id: u64, transcript: &str) -> Result<(), ServiceError> {
        self.enter(Operation::SaveTranscript)?;
        lock(&self.transcripts).insert(session_id, transcript.to_string());
        Ok(())
    }
}

#[async_trait]
impl TranscriptionService for MockServices {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        _session_id: u64,
        _recording: &AudioRecording,
    ) -> Result<TranscriptionOutcome, ServiceError> {
        self.enter(Operation::Transcribe)?;
        Ok(lock(&self.transcription).clone())
    }
}

#[async_trait]
impl AnalysisService for MockServices {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(
        &self,
        _session_id: u64,
        _transcript: &str,
    ) -> Result<NarrativeAnalysis, ServiceError> {
        self.enter(Operation::Analyze)?;
        Ok(lock(&self.analysis).clone())
    }
}

#[async_trait]
impl StimulusProvider for MockServices {
    async fn stories(
        &self,
        _grade: Grade,
        _period: Period,
        _assessment_type: AssessmentType,
    ) -> Result<Vec<Story>, ServiceError> {
        self.enter(Operation::Stories)?;
        Ok(self.stories.clone())
    }

    async fn ddm_stimulus(&self, target: &str) -> Result<DdmStimulus, ServiceError> {
        self.enter(Operation::DdmStimulus)?;
        self.stimuli
            .get(target)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("no stimulus for {target}")))
    }
}
