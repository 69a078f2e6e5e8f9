use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::answers::AnswerStore;
use crate::bank::QuestionBank;
use crate::error::QuizError;
use crate::keys::{command_for_key, KeyCommand};
use crate::models::{
    AnswerRecord, FontSize, Letter, Mode, Question, QuestionId, QuestionKind, Settings, Theme,
};
use crate::parser::{self, ParseOutcome, ParseRejection};
use crate::persistence::Snapshot;
use crate::view::{NavState, Phase, QuestionView, SessionView};

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Delay before a correct test-mode answer moves on by itself.
    pub auto_advance_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            auto_advance_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub rejected: Vec<ParseRejection>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Advance {
    Moved,
    EndOfBank,
    /// Random mode ran off the end, reshuffled and restarted at the top.
    Wrapped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOutcome {
    pub selection: BTreeSet<Letter>,
    pub committed: Option<AnswerRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub second_elapsed: bool,
    pub auto_advanced: Option<Advance>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Ignored,
    Selected(SelectOutcome),
    Advanced(Advance),
    Retreated(bool),
    ShowAnswer(bool),
}

#[derive(Debug, Clone, Copy)]
struct PendingAdvance {
    question_id: QuestionId,
    remaining: Duration,
}

/// Single owner of the bank, the recorded answers and the per-session state.
#[derive(Debug)]
pub struct QuizSession {
    bank: QuestionBank,
    answers: AnswerStore,
    settings: Settings,
    timings: Timings,
    phase: Phase,
    current_index: usize,
    resume_index: Option<usize>,
    selection: BTreeSet<Letter>,
    elapsed: Duration,
    pending_advance: Option<PendingAdvance>,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new(Timings::default())
    }
}

impl QuizSession {
    pub fn new(timings: Timings) -> Self {
        QuizSession {
            bank: QuestionBank::default(),
            answers: AnswerStore::new(),
            settings: Settings::default(),
            timings,
            phase: Phase::Uploading,
            current_index: 0,
            resume_index: None,
            selection: BTreeSet::new(),
            elapsed: Duration::ZERO,
            pending_advance: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn selection(&self) -> &BTreeSet<Letter> {
        &self.selection
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs()
    }

    pub fn has_pending_advance(&self) -> bool {
        self.pending_advance.is_some()
    }

    // Persistence

    /// Applies a persisted snapshot. Statistics are recounted from the
    /// answers; the stored position is used by the next [`QuizSession::start`].
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.settings = snapshot.settings;
        self.answers.restore(snapshot.answers);
        if self.answers.stats() != snapshot.stats {
            warn!(
                "persisted stats {:?} disagree with answers, using {:?}",
                snapshot.stats,
                self.answers.stats()
            );
        }
        self.resume_index = Some(snapshot.current_index);
        info!(
            "restored {} answers, mode {:?}",
            self.answers.records().len(),
            self.settings.mode
        );
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            settings: self.settings,
            stats: self.answers.stats(),
            answers: self.answers.records().clone(),
            current_index: self.resume_index.unwrap_or(self.current_index),
        }
    }

    // Loading

    /// Replaces the bank and returns to the upload phase. An empty set of
    /// questions is refused and leaves everything as it was.
    pub fn load_questions(&mut self, questions: Vec<Question>) -> Result<usize, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::EmptyBank);
        }
        self.bank = QuestionBank::new(questions);
        self.phase = Phase::Uploading;
        self.current_index = 0;
        self.selection.clear();
        self.elapsed = Duration::ZERO;
        self.pending_advance = None;
        info!("loaded bank of {} questions", self.bank.len());
        Ok(self.bank.len())
    }

    pub fn load_text(&mut self, text: &str) -> Result<LoadSummary, QuizError> {
        self.load_outcome(parser::parse(text))
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<LoadSummary, QuizError> {
        self.load_outcome(parser::parse_bytes(bytes)?)
    }

    pub fn load_sample(&mut self) -> Result<LoadSummary, QuizError> {
        let loaded = self.load_questions(parser::sample_bank())?;
        Ok(LoadSummary {
            loaded,
            rejected: Vec::new(),
        })
    }

    fn load_outcome(&mut self, outcome: ParseOutcome) -> Result<LoadSummary, QuizError> {
        for rejection in &outcome.rejections {
            debug!("skipped line {}: {:?}", rejection.line, rejection.reason);
        }
        let loaded = self.load_questions(outcome.questions)?;
        Ok(LoadSummary {
            loaded,
            rejected: outcome.rejections,
        })
    }

    pub fn start(&mut self) -> Result<(), QuizError> {
        if self.bank.is_empty() {
            return Err(QuizError::EmptyBank);
        }
        let last = self.bank.len() - 1;
        self.phase = Phase::Active;
        self.elapsed = Duration::ZERO;
        self.pending_advance = None;
        let resume = self.resume_index.take();
        self.current_index = if self.settings.mode == Mode::Random {
            self.bank.shuffle();
            0
        } else {
            resume.map_or(0, |i| i.min(last))
        };
        self.seed_selection();
        info!(
            "quiz started at question {} of {} in {:?} mode",
            self.current_index + 1,
            self.bank.len(),
            self.settings.mode
        );
        Ok(())
    }

    // Questions and answers

    fn ensure_active(&self) -> Result<(), QuizError> {
        if self.phase == Phase::Active && !self.bank.is_empty() {
            Ok(())
        } else {
            Err(QuizError::EmptyBank)
        }
    }

    pub fn current_question(&self) -> Result<&Question, QuizError> {
        self.ensure_active()?;
        self.bank.get(self.current_index)
    }

    fn seed_selection(&mut self) {
        self.selection = self
            .bank
            .get(self.current_index)
            .ok()
            .and_then(|q| self.answers.get(q.id))
            .map(|record| record.selected.clone())
            .unwrap_or_default();
    }

    fn go_to(&mut self, index: usize) {
        if index != self.current_index {
            self.pending_advance = None;
        }
        self.current_index = index;
        self.seed_selection();
    }

    /// Moves to `index`, clamped into the bank, and returns its view.
    pub fn display_question(&mut self, index: usize) -> Result<QuestionView, QuizError> {
        self.ensure_active()?;
        self.go_to(index.min(self.bank.len() - 1));
        self.current_question_view()
    }

    fn current_question_view(&self) -> Result<QuestionView, QuizError> {
        let question = self.current_question()?;
        Ok(QuestionView::build(
            question,
            self.current_index,
            self.bank.len(),
            &self.selection,
            self.answers.get(question.id),
            &self.settings,
        ))
    }

    pub fn select_option(&mut self, letter: Letter) -> Result<SelectOutcome, QuizError> {
        let (id, kind, correct) = {
            let q = self.current_question()?;
            (q.id, q.kind(), q.correct_answers.clone())
        };
        if self.settings.mode == Mode::Test && self.answers.is_answered(id) {
            return Err(QuizError::LockedAnswer { question_id: id });
        }

        match kind {
            QuestionKind::Single => self.selection = BTreeSet::from([letter]),
            QuestionKind::Multiple => {
                if !self.selection.remove(&letter) {
                    self.selection.insert(letter);
                }
            }
        }

        // Multi-answer questions in test mode wait for an explicit commit.
        let auto_commit = kind == QuestionKind::Single || self.settings.mode != Mode::Test;
        let committed = auto_commit.then(|| self.commit_selection(id, &correct));
        Ok(SelectOutcome {
            selection: self.selection.clone(),
            committed,
        })
    }

    pub fn commit(&mut self) -> Result<AnswerRecord, QuizError> {
        let (id, correct) = {
            let q = self.current_question()?;
            (q.id, q.correct_answers.clone())
        };
        if self.settings.mode == Mode::Test {
            if self.answers.is_answered(id) {
                return Err(QuizError::LockedAnswer { question_id: id });
            }
            if self.selection.is_empty() {
                return Err(QuizError::EmptySelection { question_id: id });
            }
        }
        Ok(self.commit_selection(id, &correct))
    }

    fn commit_selection(&mut self, id: QuestionId, correct: &BTreeSet<Letter>) -> AnswerRecord {
        let record = self.answers.submit(id, self.selection.clone(), correct);
        debug!(
            "question {} answered {:?}, correct: {}",
            id, record.selected, record.is_correct
        );
        if self.settings.mode == Mode::Test && record.is_correct {
            self.pending_advance = Some(PendingAdvance {
                question_id: id,
                remaining: self.timings.auto_advance_delay,
            });
        }
        record
    }

    // Navigation

    pub fn advance(&mut self) -> Result<Advance, QuizError> {
        self.ensure_active()?;
        if self.current_index + 1 < self.bank.len() {
            self.go_to(self.current_index + 1);
            return Ok(Advance::Moved);
        }
        if self.settings.mode == Mode::Random {
            self.reshuffle();
            return Ok(Advance::Wrapped);
        }
        Ok(Advance::EndOfBank)
    }

    pub fn retreat(&mut self) -> Result<bool, QuizError> {
        self.ensure_active()?;
        if self.current_index == 0 {
            return Ok(false);
        }
        self.go_to(self.current_index - 1);
        Ok(true)
    }

    pub fn go_first(&mut self) -> Result<(), QuizError> {
        self.ensure_active()?;
        self.go_to(0);
        Ok(())
    }

    pub fn go_last(&mut self) -> Result<(), QuizError> {
        self.ensure_active()?;
        self.go_to(self.bank.len() - 1);
        Ok(())
    }

    /// Absolute move. Out-of-range targets are refused without any change.
    pub fn jump(&mut self, index: usize) -> Result<(), QuizError> {
        self.ensure_active()?;
        if index >= self.bank.len() {
            return Err(QuizError::IndexOutOfRange {
                index,
                len: self.bank.len(),
            });
        }
        self.go_to(index);
        Ok(())
    }

    fn reshuffle(&mut self) {
        self.bank.shuffle();
        self.pending_advance = None;
        self.current_index = 0;
        self.seed_selection();
    }

    // Settings

    /// Switching into random mode reshuffles and restarts from the top.
    /// Recorded answers are never touched.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.settings.mode == mode {
            return;
        }
        self.settings.mode = mode;
        self.pending_advance = None;
        if mode == Mode::Random && !self.bank.is_empty() {
            self.reshuffle();
        }
        info!("mode set to {:?}", mode);
    }

    pub fn toggle_show_answer(&mut self) -> bool {
        self.settings.show_answer = !self.settings.show_answer;
        self.settings.show_answer
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.settings.theme = theme;
    }

    pub fn set_font_size(&mut self, font_size: FontSize) {
        self.settings.font_size = font_size;
    }

    /// Clears every recorded answer and returns to the first question.
    pub fn reset(&mut self) {
        self.answers.clear();
        self.current_index = 0;
        self.resume_index = None;
        self.pending_advance = None;
        self.seed_selection();
        info!("answers reset");
    }

    // Time

    pub fn tick(&mut self, dt: Duration) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.phase != Phase::Active {
            return outcome;
        }

        let before = self.elapsed.as_secs();
        self.elapsed += dt;
        outcome.second_elapsed = self.elapsed.as_secs() != before;

        if let Some(pending) = self.pending_advance.as_mut() {
            if dt < pending.remaining {
                pending.remaining -= dt;
            } else {
                let question_id = pending.question_id;
                self.pending_advance = None;
                let still_there = self
                    .bank
                    .get(self.current_index)
                    .is_ok_and(|q| q.id == question_id);
                if still_there {
                    outcome.auto_advanced = self.advance().ok();
                    debug!("auto-advanced: {:?}", outcome.auto_advanced);
                }
            }
        }
        outcome
    }

    // Keyboard

    pub fn handle_key(&mut self, key: &str) -> Result<KeyOutcome, QuizError> {
        let Some(command) = command_for_key(key) else {
            return Ok(KeyOutcome::Ignored);
        };
        match command {
            KeyCommand::Select(letter) => self.select_option(letter).map(KeyOutcome::Selected),
            KeyCommand::Retreat => self.retreat().map(KeyOutcome::Retreated),
            KeyCommand::Advance => self.advance().map(KeyOutcome::Advanced),
            KeyCommand::ToggleShowAnswer => Ok(KeyOutcome::ShowAnswer(self.toggle_show_answer())),
            KeyCommand::Continue => {
                if self.show_next_action() {
                    self.advance().map(KeyOutcome::Advanced)
                } else {
                    Ok(KeyOutcome::Ignored)
                }
            }
        }
    }

    // Read model

    fn nav(&self) -> NavState {
        match self.phase {
            Phase::Active => NavState::new(self.current_index, self.bank.len(), self.settings.mode),
            Phase::Uploading => NavState::default(),
        }
    }

    fn show_next_action(&self) -> bool {
        self.current_question()
            .is_ok_and(|q| self.answers.is_answered(q.id))
            && self.nav().next
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            settings: self.settings,
            question: self.current_question_view().ok(),
            index: self.current_index,
            total: self.bank.len(),
            stats: self.answers.stats().into(),
            elapsed_seconds: self.elapsed_seconds(),
            nav: self.nav(),
            show_next_action: self.show_next_action(),
            pending_auto_advance: self.has_pending_advance(),
        }
    }
}
