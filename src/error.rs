use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use std::path::PathBuf;

use crate::models::QuestionId;

/// Failures of a requested quiz operation. Returning one of these never
/// leaves the session in a partially mutated state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("no questions are loaded")]
    EmptyBank,
    #[error("question {question_id} is locked in test mode")]
    LockedAnswer { question_id: QuestionId },
    #[error("index {index} is out of range for a bank of {len} questions")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("nothing is selected for question {question_id}")]
    EmptySelection { question_id: QuestionId },
    #[error("question bank is not valid UTF-8: {0}")]
    Undecodable(#[from] std::str::Utf8Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("cannot read snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("snapshot cannot be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn from_quiz(err: QuizError, request_id: impl Into<String>) -> Self {
        let (status, code) = match &err {
            QuizError::EmptyBank => (StatusCode::CONFLICT, "EMPTY_BANK"),
            QuizError::LockedAnswer { .. } => (StatusCode::CONFLICT, "LOCKED_ANSWER"),
            QuizError::IndexOutOfRange { .. } => (StatusCode::BAD_REQUEST, "INDEX_OUT_OF_RANGE"),
            QuizError::EmptySelection { .. } => (StatusCode::BAD_REQUEST, "EMPTY_SELECTION"),
            QuizError::Undecodable(_) => (StatusCode::BAD_REQUEST, "UNDECODABLE_INPUT"),
        };
        Self::new(status, code, err.to_string(), request_id)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}
