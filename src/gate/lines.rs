//! Line protocol: one session id per input line, one JSON decision per output line.

use std::io::ErrorKind;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::middleware::RateLimitGate;
use crate::error::Result;
use crate::ratelimit::{AdmissionControl, RateLimitInfo};

/// One admission decision as written to the output.
#[derive(Debug, Serialize)]
pub struct Decision<'a> {
    pub session_id: &'a str,
    pub allowed: bool,
    pub remaining: RateLimitInfo,
    pub retry_after_secs: Option<u64>,
}

impl<'a> Decision<'a> {
    /// Ask `gate` to admit one request for `session_id`.
    pub fn decide<R: AdmissionControl>(gate: &RateLimitGate<R>, session_id: &'a str) -> Self {
        match gate.check(session_id) {
            Ok(()) => Decision {
                session_id,
                allowed: true,
                remaining: gate.remaining(session_id),
                retry_after_secs: None,
            },
            Err(exceeded) => Decision {
                session_id,
                allowed: false,
                remaining: exceeded.remaining,
                retry_after_secs: exceeded.retry_after_secs(),
            },
        }
    }
}

/// Answer one decision per input line until the input ends.
///
/// Blank lines and lines that are not valid UTF-8 are skipped. Serving stops
/// without error when the output is closed by the reader.
pub async fn serve_lines<R, I, O>(
    gate: &RateLimitGate<R>,
    mut input: I,
    mut output: O,
) -> Result<()>
where
    R: AdmissionControl,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut line_number: u64 = 0;

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_number += 1;

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(line = line_number, "Skipping input line that is not valid UTF-8");
            continue;
        };
        let session_id = line.trim();
        if session_id.is_empty() {
            continue;
        }

        let mut encoded = serde_json::to_vec(&Decision::decide(gate, session_id))?;
        encoded.push(b'\n');

        match write_line(&mut output, &encoded).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                info!("Output closed, no further decisions will be written");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!(lines = line_number, "Reached end of input");
    Ok(())
}

async fn write_line<O: AsyncWrite + Unpin>(output: &mut O, line: &[u8]) -> std::io::Result<()> {
    output.write_all(line).await?;
    output.flush().await
}
