use chrono::NaiveDate;
use std::io;
use thiserror::Error;

/// Structural and input errors (§7). Surfaced at build time, spec-loading time, or
/// from a concrete adapter (CSV/forcings) before stepping begins.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Missing parameter '{0}' required by {1}")]
    MissingParameter(String, String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Conception issue: {0}")]
    ConceptionIssue(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl From<csv::Error> for EngineError {
    fn from(value: csv::Error) -> Self {
        EngineError::InvalidArgument(value.to_string())
    }
}

impl From<io::Error> for EngineError {
    fn from(value: io::Error) -> Self {
        EngineError::InvalidArgument(value.to_string())
    }
}

/// A failure that occurred while advancing a specific step. The engine's state on
/// failure is "last successful step committed, current step rolled back" (§5): the
/// date here is the step that did *not* commit.
#[derive(Error, Debug)]
#[error("step on {date} failed: {source}")]
pub struct StepError {
    pub date: NaiveDate,
    #[source]
    pub source: EngineError,
}

impl StepError {
    pub fn new(date: NaiveDate, source: EngineError) -> Self {
        Self { date, source }
    }
}
