//! Read model handed to the presentation layer. Everything here is computed
//! from session state on demand and never mutated afterwards.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{AnswerRecord, Letter, Mode, Question, QuestionId, QuestionKind, Settings, Stats};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Uploading,
    Active,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub letter: Letter,
    pub text: String,
    pub selected: bool,
    pub marked_correct: bool,
    pub marked_incorrect: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub is_correct: Option<bool>,
    pub correct_answers: BTreeSet<Letter>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    /// 1-based position in the current order.
    pub position: usize,
    pub total: usize,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<OptionView>,
    pub selection: BTreeSet<Letter>,
    pub answered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
}

impl QuestionView {
    pub fn build(
        question: &Question,
        index: usize,
        total: usize,
        selection: &BTreeSet<Letter>,
        record: Option<&AnswerRecord>,
        settings: &Settings,
    ) -> Self {
        let answered = record.is_some_and(AnswerRecord::is_attempted);
        let reveal = settings.show_answer || (answered && settings.mode != Mode::Test);

        let options = Letter::ALL
            .into_iter()
            .map(|letter| {
                let selected = selection.contains(&letter);
                let correct = question.correct_answers.contains(&letter);
                OptionView {
                    letter,
                    text: question.option(letter).to_string(),
                    selected,
                    marked_correct: reveal && correct && (selected || settings.show_answer),
                    marked_incorrect: reveal && selected && !correct,
                }
            })
            .collect();

        let overlay = reveal.then(|| Overlay {
            is_correct: record.filter(|r| r.is_attempted()).map(|r| r.is_correct),
            correct_answers: question.correct_answers.clone(),
            explanation: question.explanation.clone(),
        });

        Self {
            id: question.id,
            position: index + 1,
            total,
            prompt: question.prompt.clone(),
            kind: question.kind(),
            options,
            selection: selection.clone(),
            answered,
            overlay,
        }
    }
}

/// Which navigation controls are enabled.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct NavState {
    pub first: bool,
    pub prev: bool,
    pub next: bool,
    pub last: bool,
}

impl NavState {
    pub fn new(index: usize, total: usize, mode: Mode) -> Self {
        if total == 0 {
            return Self::default();
        }
        let at_start = index == 0;
        let at_end = index + 1 >= total && mode != Mode::Random;
        Self {
            first: !at_start,
            prev: !at_start,
            next: !at_end,
            last: !at_end,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: Stats,
    pub accuracy_pct: u32,
}

impl From<Stats> for StatsView {
    fn from(stats: Stats) -> Self {
        Self {
            stats,
            accuracy_pct: stats.accuracy_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: Phase,
    pub settings: Settings,
    pub question: Option<QuestionView>,
    pub index: usize,
    pub total: usize,
    pub stats: StatsView,
    pub elapsed_seconds: u64,
    pub nav: NavState,
    pub show_next_action: bool,
    pub pending_auto_advance: bool,
}
