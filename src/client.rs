//! Caller side of the external-measure protocol.
//!
//! A training loop scores hypotheses by spawning an external measure
//! executable (such as `meteor-adapter`) and exchanging one line per pair:
//!
//! ```text
//! -> <hypothesis> ||| <reference>\n
//! <- <score>\n
//! ```
//!
//! [`ExternalMeasure`] wraps that exchange around a [`ScorerSession`], so the
//! process lifetime, flushing, and EOF handling are the same as on the
//! adapter's own scorer side.

use std::num::ParseFloatError;
use std::process::ExitStatus;

use thiserror::Error;
use tracing::debug;

use crate::request::{EvaluationRequest, Field};
use crate::scorer::{strip_terminator, ScorerCommand, ScorerService, ScorerSession, SessionError};

/// Sentence-boundary tokens dropped when `include_eos` is off.
const EOS_TOKENS: [&str; 2] = ["</s>", "<s>"];

/// External measure client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The measure replied with something that is not a float.
    #[error("External measure returned a non-numeric score {line:?}: {source}")]
    InvalidScore {
        /// Reply line, without its newline
        line: String,
        #[source]
        source: ParseFloatError,
    },

    /// One side was blank; nothing was sent to the measure.
    #[error("Cannot score an empty {0} sentence")]
    EmptySentence(Field),
}

/// A running external measure process.
pub struct ExternalMeasure {
    session: ScorerSession,
    include_eos: bool,
}

impl ExternalMeasure {
    /// Spawn the measure executable `run` with `args`.
    pub fn start<I, A>(run: &str, args: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let session = ScorerSession::spawn(ScorerCommand::new(run, args))?;
        Ok(Self {
            session,
            include_eos: false,
        })
    }

    /// Keep a trailing sentence-boundary token in [`score_tokens`](Self::score_tokens).
    ///
    /// Off by default, since most external measures don't expect it.
    pub fn with_eos(mut self, include_eos: bool) -> Self {
        self.include_eos = include_eos;
        self
    }

    /// Score one hypothesis against one reference.
    ///
    /// Blank sides are rejected with [`ClientError::EmptySentence`] before
    /// anything is written, so the measure keeps running.
    pub fn score(&mut self, hypothesis: &str, reference: &str) -> Result<f32, ClientError> {
        if hypothesis.trim().is_empty() {
            return Err(ClientError::EmptySentence(Field::Candidate));
        }
        if reference.trim().is_empty() {
            return Err(ClientError::EmptySentence(Field::Reference));
        }

        let request = EvaluationRequest::new(hypothesis, reference);
        self.session.send_line(&request.to_line())?;

        let reply = self.session.receive_line()?;
        let line = strip_terminator(&reply).trim();
        debug!("External measure replied {:?}", line);

        line.parse::<f32>().map_err(|source| ClientError::InvalidScore {
            line: line.to_string(),
            source,
        })
    }

    /// Score tokenized sentences, joining tokens with single spaces.
    ///
    /// A trailing `</s>` or `<s>` is dropped from each side unless
    /// [`with_eos`](Self::with_eos) is on; any other last token is kept. A side
    /// holding only that token is then empty and fails with
    /// [`ClientError::EmptySentence`].
    pub fn score_tokens(
        &mut self,
        hypothesis: &[&str],
        reference: &[&str],
    ) -> Result<f32, ClientError> {
        let hypothesis = self.join_tokens(hypothesis);
        let reference = self.join_tokens(reference);
        self.score(&hypothesis, &reference)
    }

    /// Close the pipe and wait for the measure to exit.
    pub fn finish(mut self) -> Result<Option<ExitStatus>, ClientError> {
        Ok(self.session.shutdown()?)
    }

    fn join_tokens(&self, tokens: &[&str]) -> String {
        let tokens = match tokens.split_last() {
            Some((last, rest)) if !self.include_eos && EOS_TOKENS.contains(last) => rest,
            _ => tokens,
        };
        tokens.join(" ")
    }
}
