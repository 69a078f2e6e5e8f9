//! Question-bank text format.
//!
//! One question per line:
//!
//! ```text
//! prompt<SEP>optionA<SEP>optionB<SEP>optionC<SEP>optionD<SEP>answer[<SEP>explanation]
//! ```
//!
//! `<SEP>` is `|` when the line contains one, `,` otherwise. Malformed lines
//! are skipped and reported, never fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::QuizError;
use crate::models::{Letter, Question, QuestionId};

const MIN_FIELDS: usize = 6;

static ANSWER_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;/\s]+").unwrap());

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RejectReason {
    TooFewFields { found: usize },
    EmptyPrompt,
    EmptyAnswer,
    InvalidAnswer,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ParseRejection {
    /// 1-based line number in the source text.
    pub line: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub questions: Vec<Question>,
    pub rejections: Vec<ParseRejection>,
}

impl ParseOutcome {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }
}

/// Parses raw bytes, failing only when they are not UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParseOutcome, QuizError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(parse(text.trim_start_matches('\u{feff}')))
}

pub fn parse(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut next_id: QuestionId = 1;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, next_id) {
            Ok(question) => {
                outcome.questions.push(question);
                next_id += 1;
            }
            Err(reason) => outcome.rejections.push(ParseRejection {
                line: idx + 1,
                reason,
            }),
        }
    }

    outcome
}

fn parse_line(line: &str, id: QuestionId) -> Result<Question, RejectReason> {
    let separator = if line.contains('|') { '|' } else { ',' };
    let fields: Vec<&str> = line.split(separator).map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(RejectReason::TooFewFields { found: fields.len() });
    }

    let prompt = fields[0];
    if prompt.is_empty() {
        return Err(RejectReason::EmptyPrompt);
    }

    let options: [String; 4] = std::array::from_fn(|i| {
        let text = fields[i + 1];
        if text.is_empty() {
            format!("Option {}", Letter::ALL[i])
        } else {
            text.to_string()
        }
    });

    // With a comma separator the answer letters of a multi-answer line land
    // in consecutive fields.
    let mut answer_fields = vec![fields[5]];
    let mut rest = MIN_FIELDS;
    if separator == ',' {
        while rest < fields.len() && Letter::from_token(fields[rest]).is_some() {
            answer_fields.push(fields[rest]);
            rest += 1;
        }
    }

    let correct_answers = parse_answer(&answer_fields.join(","))?;

    // Sliced from the raw line so the explanation keeps its own spacing.
    let explanation = line.splitn(rest + 1, separator).nth(rest).unwrap_or("").trim();

    Ok(Question {
        id,
        prompt: prompt.to_string(),
        options,
        correct_answers,
        explanation: (!explanation.is_empty()).then(|| explanation.to_string()),
    })
}

fn parse_answer(raw: &str) -> Result<BTreeSet<Letter>, RejectReason> {
    let upper = raw.to_uppercase();
    let tokens: Vec<&str> = ANSWER_SEPARATORS
        .split(&upper)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(RejectReason::EmptyAnswer);
    }
    let letters: BTreeSet<Letter> = tokens.into_iter().filter_map(Letter::from_token).collect();
    if letters.is_empty() {
        return Err(RejectReason::InvalidAnswer);
    }
    Ok(letters)
}

/// Built-in bank offered when the user has no file at hand.
pub fn sample_bank() -> Vec<Question> {
    let entries: [(&str, [&str; 4], Letter, &str); 3] = [
        (
            "What is the chemical formula of water?",
            ["H₂O", "CO₂", "O₂", "NaCl"],
            Letter::A,
            "Water is made of two hydrogen atoms and one oxygen atom.",
        ),
        (
            "What is the capital of China?",
            ["Shanghai", "Guangzhou", "Beijing", "Shenzhen"],
            Letter::C,
            "Beijing is the capital and political centre of China.",
        ),
        (
            "How many months are there in a year?",
            ["10", "11", "12", "13"],
            Letter::C,
            "The Gregorian calendar divides the year into 12 months.",
        ),
    ];

    entries
        .into_iter()
        .zip(1..)
        .map(|((prompt, options, answer, explanation), id)| Question {
            id,
            prompt: prompt.to_string(),
            options: options.map(String::from),
            correct_answers: BTreeSet::from([answer]),
            explanation: Some(explanation.to_string()),
        })
        .collect()
}
