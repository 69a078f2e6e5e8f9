use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type QuestionId = u32;

/// Option letter. Every question carries exactly four options, `A` to `D`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            _ => None,
        }
    }

    /// Parses a token that is exactly one letter, ignoring case.
    pub fn from_token(token: &str) -> Option<Letter> {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Letter::from_char(c),
            _ => None,
        }
    }

    pub fn from_index(index: usize) -> Option<Letter> {
        Letter::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_char(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub options: [String; 4],
    pub correct_answers: BTreeSet<Letter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        if self.correct_answers.len() == 1 {
            QuestionKind::Single
        } else {
            QuestionKind::Multiple
        }
    }

    pub fn option(&self, letter: Letter) -> &str {
        &self.options[letter.index()]
    }

    pub fn is_correct(&self, selected: &BTreeSet<Letter>) -> bool {
        score_answer(&self.correct_answers, selected)
    }
}

/// Exact, order-independent match. No partial credit.
pub fn score_answer(correct: &BTreeSet<Letter>, selected: &BTreeSet<Letter>) -> bool {
    correct == selected
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub selected: BTreeSet<Letter>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn evaluate(selected: BTreeSet<Letter>, correct: &BTreeSet<Letter>) -> Self {
        let is_correct = score_answer(correct, &selected);
        Self {
            selected,
            is_correct,
            answered_at: Utc::now(),
        }
    }

    /// A record with an empty selection exists but does not count as attempted.
    pub fn is_attempted(&self) -> bool {
        !self.selected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub correct: u32,
    pub incorrect: u32,
    pub total_attempted: u32,
}

impl Stats {
    pub fn accuracy_pct(&self) -> u32 {
        if self.total_attempted == 0 {
            0
        } else {
            ((self.correct as f64) * 100.0 / (self.total_attempted as f64)).round() as u32
        }
    }

    pub(crate) fn apply(&mut self, record: &AnswerRecord) {
        if !record.is_attempted() {
            return;
        }
        self.total_attempted += 1;
        if record.is_correct {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
    }

    pub(crate) fn retract(&mut self, record: &AnswerRecord) {
        if !record.is_attempted() {
            return;
        }
        self.total_attempted = self.total_attempted.saturating_sub(1);
        if record.is_correct {
            self.correct = self.correct.saturating_sub(1);
        } else {
            self.incorrect = self.incorrect.saturating_sub(1);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Practice,
    Test,
    Random,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub mode: Mode,
    pub theme: Theme,
    pub font_size: FontSize,
    pub show_answer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(s: &str) -> BTreeSet<Letter> {
        s.chars().filter_map(Letter::from_char).collect()
    }

    fn question(correct: &str) -> Question {
        Question {
            id: 1,
            prompt: "Pick".into(),
            options: ["w".into(), "x".into(), "y".into(), "z".into()],
            correct_answers: letters(correct),
            explanation: None,
        }
    }

    #[test]
    fn kind_follows_answer_count() {
        assert_eq!(question("A").kind(), QuestionKind::Single);
        assert_eq!(question("AC").kind(), QuestionKind::Multiple);
    }

    #[test]
    fn scoring_is_exact_set_equality() {
        let q = question("AC");
        assert!(q.is_correct(&letters("CA")));
        assert!(!q.is_correct(&letters("A")));
        assert!(!q.is_correct(&letters("ACD")));
        assert!(!q.is_correct(&BTreeSet::new()));
    }

    #[test]
    fn letter_tokens() {
        assert_eq!(Letter::from_token("c"), Some(Letter::C));
        assert_eq!(Letter::from_token("E"), None);
        assert_eq!(Letter::from_token("AB"), None);
        assert_eq!(Letter::from_index(3), Some(Letter::D));
        assert_eq!(Letter::B.to_string(), "B");
    }

    #[test]
    fn empty_selection_is_not_attempted() {
        let mut stats = Stats::default();
        stats.apply(&AnswerRecord::evaluate(BTreeSet::new(), &letters("A")));
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn stats_accuracy_pct() {
        let s = Stats {
            correct: 2,
            incorrect: 1,
            total_attempted: 3,
        };
        assert_eq!(s.accuracy_pct(), 67);
        assert_eq!(Stats::default().accuracy_pct(), 0);
    }

    #[test]
    fn settings_use_camel_case() {
        let raw = serde_json::to_string(&Settings::default()).unwrap();
        assert!(raw.contains("\"fontSize\":\"medium\""));
        assert!(raw.contains("\"showAnswer\":false"));
        let parsed: Settings = serde_json::from_str(r#"{"mode":"random"}"#).unwrap();
        assert_eq!(parsed.mode, Mode::Random);
        assert_eq!(parsed.theme, Theme::Light);
    }
}
