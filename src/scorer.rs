//! Process manager for the external scorer.
//!
//! This module owns the one subprocess the adapter talks to and the line
//! framing used on its pipes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    stdin: request lines     ┌─────────────────────┐
//! │  Bridge         │  ─────────────────────────► │  external scorer    │
//! │ (ScorerSession) │  ◄───────────────────────── │  (e.g. METEOR)      │
//! └─────────────────┘    stdout: reply lines      └─────────────────────┘
//! ```
//!
//! Requests and replies are strictly 1:1 and FIFO. Nothing is pipelined, so
//! a flush after every request is sufficient to rule out deadlock.
//!
//! # Usage
//!
//! ```ignore
//! use meteor_adapter::scorer::{ScorerCommand, ScorerService, ScorerSession};
//!
//! let mut session = ScorerSession::spawn(ScorerCommand::new("java", ["-jar", "meteor-1.5.jar"]))?;
//! session.send_line("SCORE ||| reference ||| candidate")?;
//! let stats = session.receive_line()?;
//! session.shutdown()?;
//! ```

mod framing;
mod session;

pub use framing::{is_terminated, read_line, strip_terminator, write_line};
pub use session::{ScorerCommand, ScorerService, ScorerSession, SessionError, SessionState};
