//! Streamed text output for `generate` and `chat`.

use std::io::{Write, stderr, stdout};

use anyhow::{Context, Result};
use delve_core::core::interrupt::{self, InterruptedError};
use delve_core::providers::TextStream;
use futures_util::StreamExt;

/// Writes text deltas to stdout as they arrive and returns the full reply.
///
/// Ctrl+C stops the stream with `InterruptedError`; text already printed
/// stays on screen.
pub async fn print_stream(mut stream: TextStream) -> Result<String> {
    let mut out = stdout();
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            () = interrupt::wait_for_interrupt() => {
                let _ = writeln!(out);
                let _ = writeln!(stderr(), "^C Interrupted.");
                return Err(InterruptedError.into());
            }
        };
        match next {
            Some(Ok(delta)) => {
                let _ = write!(out, "{delta}");
                let _ = out.flush();
                text.push_str(&delta);
            }
            Some(Err(e)) => {
                if !text.is_empty() {
                    let _ = writeln!(out);
                }
                return Err(e).context("stream reply");
            }
            None => break,
        }
    }

    if !text.ends_with('\n') {
        let _ = writeln!(out);
    }
    let _ = out.flush();
    Ok(text)
}
