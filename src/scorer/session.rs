//! Lifecycle management for the external scorer subprocess.
//!
//! A [`ScorerSession`] owns exactly one child process and the two pipes
//! attached to it. Requests go out on the child's stdin, replies come back on
//! its stdout, and stderr is inherited so scorer diagnostics reach the
//! operator without polluting the reply stream.
//!
//! # State Machine
//!
//! ```text
//! NotStarted ──start()──► Running ──shutdown()──► Closing ──wait──► Terminated
//!      │                                                               ▲
//!      └──────────────────────────shutdown()───────────────────────────┘
//! ```
//!
//! `send_line`/`receive_line` are only valid while `Running`. `shutdown` is
//! idempotent once `Terminated`.

use std::fmt;
use std::io::{self, BufReader, BufWriter};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::scorer::framing::{is_terminated, read_line, write_line};

/// Number of exit polls performed when a running session is dropped.
const DROP_WAIT_ATTEMPTS: u32 = 10;

/// Delay between exit polls when a running session is dropped.
const DROP_WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// Scorer session error types.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The scorer executable could not be found or failed to start.
    #[error("Failed to launch scorer `{program}`: {source}")]
    Launch {
        /// Program that was being launched
        program: String,
        #[source]
        source: io::Error,
    },

    /// The reply stream closed before a complete line arrived.
    #[error("Scorer closed its output before a complete reply line ({} bytes received)", .partial.len())]
    PrematureEof {
        /// Whatever was read before the stream closed (possibly empty)
        partial: String,
    },

    /// The operation is not valid in the session's current state.
    #[error("Cannot {operation} a scorer session that is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// I/O error on one of the scorer pipes.
    #[error("I/O error on scorer pipe: {0}")]
    Io(#[from] io::Error),
}

/// Lifecycle state of a [`ScorerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no child process spawned yet.
    NotStarted,
    /// Child is alive and both pipes are open.
    Running,
    /// Request stream closed, waiting for the child to exit.
    Closing,
    /// Child has been reaped (or was never started). Final.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NotStarted => "not started",
            SessionState::Running => "running",
            SessionState::Closing => "closing",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Program and argument vector used to launch a scorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ScorerCommand {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv-style vector (`argv[0]` is the program).
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl fmt::Display for ScorerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Request/reply channel to an external line-oriented process.
///
/// This trait is the seam between the protocol bridge and the process that
/// answers it, so the bridge can be driven by an in-process scorer in tests.
pub trait ScorerService {
    /// Write one request line and flush it.
    fn send_line(&mut self, line: &str) -> Result<(), SessionError>;

    /// Block until one complete reply line is available and return it,
    /// trailing newline included.
    fn receive_line(&mut self) -> Result<String, SessionError>;
}

/// The single external scorer process and its pipes.
///
/// # Process Cleanup Safety
///
/// The session owns the child process. If it is dropped while still
/// running (an abort path), `Drop` closes the request pipe, gives the child
/// a short grace period to exit, then kills it so no scorer is orphaned.
pub struct ScorerSession {
    command: ScorerCommand,
    state: SessionState,
    child: Option<Child>,
    writer: Option<BufWriter<ChildStdin>>,
    reader: Option<BufReader<ChildStdout>>,
    exit_status: Option<ExitStatus>,
}

impl ScorerSession {
    /// Create a session for `command` without launching it.
    pub fn new(command: ScorerCommand) -> Self {
        Self {
            command,
            state: SessionState::NotStarted,
            child: None,
            writer: None,
            reader: None,
            exit_status: None,
        }
    }

    /// Create a session and launch it immediately.
    pub fn spawn(command: ScorerCommand) -> Result<Self, SessionError> {
        let mut session = Self::new(command);
        session.start()?;
        Ok(session)
    }

    /// Launch the scorer with piped stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Launch` if the executable cannot be found or
    /// the spawn fails, and `SessionError::InvalidState` if the session was
    /// already started.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::NotStarted, "start")?;

        info!("Starting scorer: {}", self.command);

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SessionError::Launch {
                program: self.command.program.clone(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SessionError::Launch {
                    program: self.command.program.clone(),
                    source: io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "scorer stdio pipes were not captured",
                    ),
                });
            }
        };

        debug!("Scorer running with pid {}", child.id());

        self.writer = Some(BufWriter::new(stdin));
        self.reader = Some(BufReader::new(stdout));
        self.child = Some(child);
        self.state = SessionState::Running;

        Ok(())
    }

    /// Close the request stream, wait for the scorer to exit, and record its
    /// exit status.
    ///
    /// Never kills the child: a scorer that ignores end-of-input keeps this
    /// call blocked. Calling it again after termination returns the recorded
    /// status. Calling it on a session that never started moves it straight
    /// to `Terminated` with no status.
    pub fn shutdown(&mut self) -> Result<Option<ExitStatus>, SessionError> {
        match self.state {
            SessionState::Terminated => return Ok(self.exit_status),
            SessionState::NotStarted => {
                debug!("Shutting down scorer session that was never started");
                self.state = SessionState::Terminated;
                return Ok(None);
            }
            SessionState::Running | SessionState::Closing => {}
        }

        self.close_input();

        let status = match self.child.as_mut() {
            Some(child) => child.wait()?,
            None => {
                // Only reachable if the child handle was lost mid-transition.
                self.state = SessionState::Terminated;
                return Ok(None);
            }
        };

        self.child = None;
        self.reader = None;
        self.exit_status = Some(status);
        self.state = SessionState::Terminated;

        if status.success() {
            info!("Scorer exited cleanly ({})", status);
        } else {
            warn!("Scorer exited with {}", status);
        }

        Ok(Some(status))
    }

    /// Drop the request pipe so the child sees end-of-input.
    ///
    /// Moves `Running` to `Closing` and leaves the child running, which lets
    /// a caller observe the closed-input state before waiting.
    pub fn close_input(&mut self) {
        if self.state != SessionState::Running {
            return;
        }

        // write_line flushes every message, so there is nothing buffered.
        self.writer = None;
        self.state = SessionState::Closing;
        debug!("Closed scorer input stream");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Exit status recorded by [`shutdown`](Self::shutdown), if any.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// OS process id of the running child, if any.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl ScorerService for ScorerSession {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.require(SessionState::Running, "send to")?;
        let writer = self.writer.as_mut().ok_or(SessionError::InvalidState {
            operation: "send to",
            state: self.state,
        })?;

        write_line(writer, line)?;
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String, SessionError> {
        self.require(SessionState::Running, "receive from")?;
        let reader = self.reader.as_mut().ok_or(SessionError::InvalidState {
            operation: "receive from",
            state: self.state,
        })?;

        match read_line(reader)? {
            Some(line) if is_terminated(&line) => Ok(line),
            Some(partial) => Err(SessionError::PrematureEof { partial }),
            None => Err(SessionError::PrematureEof {
                partial: String::new(),
            }),
        }
    }
}

impl Drop for ScorerSession {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        // Closing stdin is how a well-behaved scorer learns to exit.
        self.writer = None;

        for _ in 0..DROP_WAIT_ATTEMPTS {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Scorer exited after session drop ({})", status);
                    return;
                }
                Ok(None) => thread::sleep(DROP_WAIT_INTERVAL),
                Err(e) => {
                    warn!("Error waiting for scorer: {}", e);
                    return;
                }
            }
        }

        warn!("Scorer didn't exit after session drop, killing");
        let _ = child.kill();
        let _ = child.wait();
    }
}
