//! Interactive classification loop.
//!
//! Reads one text per line, prints the prediction as pretty JSON and keeps an
//! unlabelled row for each. Rows are appended to the output CSV when the loop
//! ends, including when it is interrupted.

use std::future::Future;
use std::io::{self, Read, Write};
use std::path::Path;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::{append_rows, EvaluationRow};
use crate::agent::{SentimentClassifier, SentimentService};
use crate::core::Result;

pub const PROMPT: &str = "Enter text ('quit' to exit): ";

const READ_CHUNK: usize = 8 * 1024;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `quit` or `exit` was entered.
    Quit,
    /// Input reached end of file.
    Eof,
    /// The interrupt future resolved.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub rows: Vec<EvaluationRow>,
    pub exit: Exit,
}

fn is_exit_word(text: &str) -> bool {
    text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit")
}

/// Run the loop over `input`, writing prompts and predictions to `out`.
///
/// `interrupt` is usually Ctrl-C. Lines already buffered are handled before
/// an interrupt is noticed. Rows classified before a read or write error are
/// still saved.
pub async fn run<C, R, W, F>(
    service: &SentimentService<C>,
    input: R,
    out: &mut W,
    interrupt: F,
    output: &Path,
) -> Result<Session>
where
    C: SentimentClassifier,
    R: AsyncBufRead + Unpin,
    W: Write,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut rows = Vec::new();
    let interrupt = std::pin::pin!(interrupt);

    let exit = match prompt_loop(service, &mut lines, out, interrupt, &mut rows).await {
        Ok(exit) => exit,
        Err(e) => {
            if !rows.is_empty() {
                warn!(rows = rows.len(), error = %e, "session failed, saving partial results");
                append_rows(output, &rows)?;
            }
            return Err(e);
        }
    };

    if exit == Exit::Interrupted {
        writeln!(out)?;
        warn!(rows = rows.len(), "interrupted, saving partial results");
    }
    if !rows.is_empty() {
        append_rows(output, &rows)?;
        info!(output = %output.display(), rows = rows.len(), "saved interactive results");
        writeln!(out, "Results saved to {}", output.display())?;
    }
    writeln!(out, "Goodbye!")?;

    Ok(Session { rows, exit })
}

async fn prompt_loop<C, R, W, F>(
    service: &SentimentService<C>,
    lines: &mut Lines<R>,
    out: &mut W,
    mut interrupt: Pin<&mut F>,
    rows: &mut Vec<EvaluationRow>,
) -> Result<Exit>
where
    C: SentimentClassifier,
    R: AsyncBufRead + Unpin,
    W: Write,
    F: Future<Output = ()>,
{
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            line = lines.next_line() => line?,
            _ = interrupt.as_mut() => return Ok(Exit::Interrupted),
        };
        let Some(line) = line else {
            return Ok(Exit::Eof);
        };

        let text = line.trim();
        if is_exit_word(text) {
            return Ok(Exit::Quit);
        }
        if text.is_empty() {
            continue;
        }

        let prediction = service.predict(text);
        writeln!(out, "{}", serde_json::to_string_pretty(&prediction)?)?;
        rows.push(EvaluationRow::unlabelled(text, prediction));
    }
}

/// Wrap a blocking reader (usually stdin) as an async line source.
///
/// The reader runs on its own detached thread, so a pending read never holds
/// up runtime shutdown. Must be called from within a tokio runtime.
pub fn detached_reader<R>(mut reader: R) -> Result<BufReader<DuplexStream>>
where
    R: Read + Send + 'static,
{
    let (rx, mut tx) = tokio::io::duplex(READ_CHUNK);
    let handle = Handle::current();

    std::thread::Builder::new()
        .name("line-reader".into())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "input read failed");
                        break;
                    }
                };
                // The receiving half is gone once the session ends.
                if handle.block_on(tx.write_all(&buf[..n])).is_err() {
                    break;
                }
            }
        })?;

    Ok(BufReader::new(rx))
}
