//! METEOR Adapter Library
//!
//! This library provides the components behind the `meteor-adapter` binary,
//! which turns the one-pair-per-line protocol of a translation training loop
//! into METEOR's two-phase `-stdio` protocol:
//!
//! - `scorer` - process manager and line framing for the external scorer
//! - `bridge` - the per-request loop (`SCORE` then `EVAL`, flush per line)
//! - `request` - request parsing and scorer command formatting
//! - `config` - scorer invocation from flags, environment, and config file
//! - `client` - the training-loop side, for driving any external measure
//!
//! # Bridge
//!
//! ```ignore
//! use meteor_adapter::bridge::{serve, MalformedPolicy};
//! use meteor_adapter::scorer::ScorerCommand;
//!
//! let command = ScorerCommand::new("java", ["-Xmx2G", "-jar", "meteor-1.5.jar", "-", "-", "-stdio"]);
//! let stdin = std::io::stdin();
//! let summary = serve(command, MalformedPolicy::Abort, stdin.lock(), std::io::stdout().lock())?;
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod request;
pub mod scorer;
