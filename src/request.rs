//! Message types for the two line protocols.
//!
//! Caller side, one request per line:
//!
//! ```text
//! <candidate> ||| <reference>\n
//! ```
//!
//! Scorer side, two phases per request:
//!
//! ```text
//! SCORE ||| <reference> ||| <candidate>\n   -> <statistics>\n
//! EVAL ||| <statistics>\n                   -> <score>\n
//! ```

use std::fmt;

use thiserror::Error;

/// Field separator shared by both protocols.
pub const DELIMITER: &str = "|||";

/// Command token for the compute-statistics phase.
pub const SCORE_TOKEN: &str = "SCORE";

/// Command token for the evaluate-statistics phase.
pub const EVAL_TOKEN: &str = "EVAL";

/// Which side of a request a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Candidate,
    Reference,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Candidate => f.write_str("candidate"),
            Field::Reference => f.write_str("reference"),
        }
    }
}

/// Reasons a caller line is not a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The line did not split into exactly two fields.
    #[error("expected exactly 2 fields separated by `|||`, found {0}")]
    FieldCount(usize),

    /// One side was empty after trimming.
    #[error("{0} text is empty")]
    EmptyField(Field),
}

/// One candidate/reference pair to score.
///
/// Both sides are plain, already-tokenized text with surrounding whitespace
/// removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    candidate: String,
    reference: String,
}

impl EvaluationRequest {
    pub fn new(candidate: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            reference: reference.into(),
        }
    }

    /// Parse a caller line of the form `candidate ||| reference`.
    ///
    /// The line may still carry its newline. Exactly one delimiter is
    /// required and both sides must be non-empty after trimming.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();

        let [candidate, reference] = fields.as_slice() else {
            return Err(RequestError::FieldCount(fields.len()));
        };

        if candidate.is_empty() {
            return Err(RequestError::EmptyField(Field::Candidate));
        }
        if reference.is_empty() {
            return Err(RequestError::EmptyField(Field::Reference));
        }

        Ok(Self::new(*candidate, *reference))
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Caller-side line for this request (the form [`parse`](Self::parse)
    /// accepts), newline-terminated.
    pub fn to_line(&self) -> String {
        format!("{} {} {}\n", self.candidate, DELIMITER, self.reference)
    }

    /// Phase-1 command: reference first, then candidate.
    pub fn statistics_command(&self) -> String {
        format!(
            "{} {} {} {} {}\n",
            SCORE_TOKEN, DELIMITER, self.reference, DELIMITER, self.candidate
        )
    }
}

/// Phase-2 command for a statistics line returned by phase 1.
///
/// `stats_line` is appended verbatim. It normally still carries its newline,
/// in which case no second one is added.
pub fn evaluation_command(stats_line: &str) -> String {
    let mut command = format!("{} {} {}", EVAL_TOKEN, DELIMITER, stats_line);
    if !command.ends_with('\n') {
        command.push('\n');
    }
    command
}
