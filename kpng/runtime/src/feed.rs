//! Reads newline-delimited JSON ops into a sink.

use anyhow::{Context, Result};
use kpng_localsink::{Callback, Op, Sink};
use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, trace};

/// Feeds every op read from `reader` to `sink` until the input ends or
/// `shutdown` completes. Shutdown is only observed between ops, so a pass
/// in progress is finished first.
///
/// Returns the number of passes run. A line that is not a valid op is an
/// error.
pub(crate) async fn run<R, C, S>(reader: R, sink: &mut Sink<C>, shutdown: S) -> Result<usize>
where
    R: AsyncRead + Unpin,
    C: Callback,
    S: Future,
{
    let mut lines = BufReader::new(reader).lines();
    tokio::pin!(shutdown);

    let mut passes = 0;
    let mut lineno = 0usize;
    loop {
        let line = tokio::select! {
            biased;
            _handle = &mut shutdown => {
                debug!("Shutdown requested");
                break;
            }
            line = lines.next_line() => line.context("failed to read ops")?,
        };
        let Some(line) = line else {
            break;
        };
        lineno += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        trace!(lineno, "Read op");
        let op = Op::from_json(line).with_context(|| format!("malformed op on line {lineno}"))?;
        if sink.send(op).await {
            passes += 1;
        }
    }

    Ok(passes)
}
