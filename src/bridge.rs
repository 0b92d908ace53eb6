//! Protocol bridge between the caller's line protocol and the scorer's
//! two-phase protocol.
//!
//! For every caller line the bridge:
//!
//! 1. parses `candidate ||| reference`,
//! 2. sends `SCORE ||| reference ||| candidate` and reads the statistics line,
//! 3. sends `EVAL ||| <statistics>` and reads the score line,
//! 4. writes the score line back to the caller and flushes.
//!
//! The loop runs on a single thread and ends when the caller's input ends.
//! Every write, in both directions, goes through
//! [`write_line`](crate::scorer::write_line), which always flushes.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::process::ExitStatus;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::request::{evaluation_command, EvaluationRequest, RequestError};
use crate::scorer::{
    read_line, write_line, ScorerCommand, ScorerService, ScorerSession, SessionError,
};

/// What to do with a caller line that is not a valid request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// End the run with an error.
    #[default]
    Abort,
    /// Answer the line with an empty output line and keep going.
    Skip,
}

impl MalformedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedPolicy::Abort => "abort",
            MalformedPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(MalformedPolicy::Abort),
            "skip" => Ok(MalformedPolicy::Skip),
            other => Err(format!(
                "unknown malformed-line policy `{}` (expected `abort` or `skip`)",
                other
            )),
        }
    }
}

/// Scorer exchange phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `SCORE ||| ...` -> statistics line
    Statistics,
    /// `EVAL ||| ...` -> score line
    Evaluation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Statistics => f.write_str("statistics"),
            Phase::Evaluation => f.write_str("evaluation"),
        }
    }
}

/// Failure during one scorer exchange.
#[derive(Debug, Error)]
#[error("{phase} phase failed: {source}")]
pub struct ScoreError {
    pub phase: Phase,
    #[source]
    pub source: SessionError,
}

/// Errors that end a bridge run.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A caller line was not a valid request (under `MalformedPolicy::Abort`).
    #[error("Malformed request on line {line}: {source}")]
    MalformedRequest {
        /// 1-based line number in the caller's input
        line: u64,
        #[source]
        source: RequestError,
    },

    /// The scorer failed to answer a request.
    #[error("Scorer failed on request {line}: {source}")]
    Scorer {
        /// 1-based line number in the caller's input
        line: u64,
        #[source]
        source: ScoreError,
    },

    /// Reading the caller's input failed.
    #[error("Failed to read request input: {0}")]
    Input(#[source] io::Error),

    /// Writing to the caller's output failed.
    #[error("Failed to write score output: {0}")]
    Output(#[source] io::Error),
}

/// Errors from [`serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    /// The scorer could not be launched; no request was served.
    #[error("Failed to start scorer: {0}")]
    Start(#[source] SessionError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Waiting for the scorer to exit failed.
    #[error("Failed to shut down scorer: {0}")]
    Shutdown(#[source] SessionError),
}

/// Counters for one bridge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Caller lines read.
    pub requests: u64,
    /// Score lines emitted.
    pub scored: u64,
    /// Malformed lines answered with an empty line.
    pub skipped: u64,
    /// Scorer exit status, once the session has been shut down.
    pub scorer_exit: Option<ExitStatus>,
}

/// Drives a [`ScorerService`] with requests read from the caller.
pub struct Bridge<S> {
    scorer: S,
    policy: MalformedPolicy,
}

impl<S: ScorerService> Bridge<S> {
    pub fn new(scorer: S) -> Self {
        Self {
            scorer,
            policy: MalformedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run both scorer phases for one request and return the score line,
    /// trailing newline included.
    pub fn score(&mut self, request: &EvaluationRequest) -> Result<String, ScoreError> {
        let stats = self.exchange(Phase::Statistics, &request.statistics_command())?;
        self.exchange(Phase::Evaluation, &evaluation_command(&stats))
    }

    /// Serve requests from `input` until it ends, writing one line to
    /// `output` per input line.
    ///
    /// # Errors
    ///
    /// Stops at the first error. Nothing is written for the request that
    /// failed.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut output: W,
    ) -> Result<RunSummary, BridgeError> {
        let mut summary = RunSummary::default();

        while let Some(line) = read_line(&mut input).map_err(BridgeError::Input)? {
            summary.requests += 1;
            let line_number = summary.requests;

            let request = match EvaluationRequest::parse(&line) {
                Ok(request) => request,
                Err(source) => match self.policy {
                    MalformedPolicy::Abort => {
                        return Err(BridgeError::MalformedRequest {
                            line: line_number,
                            source,
                        });
                    }
                    MalformedPolicy::Skip => {
                        warn!("Skipping malformed request on line {}: {}", line_number, source);
                        emit_line(&mut output, "")?;
                        summary.skipped += 1;
                        continue;
                    }
                },
            };

            trace!(
                "Request {}: candidate={:?} reference={:?}",
                line_number,
                request.candidate(),
                request.reference()
            );

            let score = self.score(&request).map_err(|source| BridgeError::Scorer {
                line: line_number,
                source,
            })?;

            emit_line(&mut output, &score)?;
            summary.scored += 1;
        }

        debug!(
            "Input ended after {} requests ({} scored, {} skipped)",
            summary.requests, summary.scored, summary.skipped
        );

        Ok(summary)
    }

    pub fn scorer_mut(&mut self) -> &mut S {
        &mut self.scorer
    }

    pub fn into_scorer(self) -> S {
        self.scorer
    }

    fn exchange(&mut self, phase: Phase, command: &str) -> Result<String, ScoreError> {
        self.scorer
            .send_line(command)
            .and_then(|()| self.scorer.receive_line())
            .map_err(|source| ScoreError { phase, source })
    }
}

/// Write one line to the caller and flush it.
fn emit_line<W: Write>(output: &mut W, line: &str) -> Result<(), BridgeError> {
    write_line(output, line).map_err(BridgeError::Output)
}

/// Launch `command`, bridge `input` to `output` through it, and shut it down
/// once `input` ends.
///
/// On error the session is dropped, which closes the scorer's input and
/// kills it if it does not exit on its own.
pub fn serve<R: BufRead, W: Write>(
    command: ScorerCommand,
    policy: MalformedPolicy,
    input: R,
    output: W,
) -> Result<RunSummary, ServeError> {
    let session = ScorerSession::spawn(command).map_err(ServeError::Start)?;
    let mut bridge = Bridge::new(session).with_policy(policy);

    let mut summary = bridge.run(input, output)?;

    let mut session = bridge.into_scorer();
    summary.scorer_exit = session.shutdown().map_err(ServeError::Shutdown)?;

    info!(
        "Served {} requests ({} scored, {} skipped)",
        summary.requests, summary.scored, summary.skipped
    );

    Ok(summary)
}
