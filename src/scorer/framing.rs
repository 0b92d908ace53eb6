//! Newline framing for the line-oriented stdio protocols.
//!
//! Both protocols this crate speaks (caller-facing and scorer-facing) are
//! one message per line. This module holds the only two primitives that
//! touch the wire:
//!
//! - [`write_line`] writes a line, terminates it, and **always flushes**.
//! - [`read_line`] reads up to and including the next `\n`.
//!
//! Every write in the crate goes through [`write_line`], so no call site can
//! forget the flush that keeps the child process and the caller from
//! deadlocking on buffered data.
//!
//! # Wire Format
//!
//! ```text
//! <payload>\n
//! ```
//!
//! Lines are UTF-8. The trailing newline is kept on everything that is read,
//! so a reply can be forwarded verbatim without re-terminating it.

use std::io::{self, BufRead, Write};

/// Write `line` to `writer`, newline-terminated, and flush.
///
/// A `line` that already ends with `\n` is written as-is; otherwise a single
/// `\n` is appended. The flush happens unconditionally.
///
/// # Errors
///
/// Returns an error if the write or the flush fails (for example a broken
/// pipe after the peer exited).
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    if !line.ends_with('\n') {
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Read one line from `reader`, keeping the trailing newline.
///
/// Returns `Ok(None)` at end of stream when nothing was read. A final line
/// without a newline is returned as-is; callers decide whether that counts
/// as complete (see [`is_terminated`]).
///
/// # Errors
///
/// Returns an error if the read fails or the data is not valid UTF-8.
pub fn read_line<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line)?;

    if bytes_read == 0 {
        return Ok(None);
    }

    Ok(Some(line))
}

/// Whether `line` carries its terminating newline.
pub fn is_terminated(line: &str) -> bool {
    line.ends_with('\n')
}

/// Strip a single trailing `\n` (and a preceding `\r`, if present).
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
