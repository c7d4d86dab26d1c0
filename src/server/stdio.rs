// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Newline-delimited JSON-RPC transport.
//!
//! Requests are handled concurrently; replies are written by a single task in
//! completion order. Reading stops at end of input (in-flight requests are
//! allowed to finish) or when shutdown is signalled (they are aborted).

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{McpServer, ServerError, OUTBOUND_CAPACITY};
use crate::mcp::protocol::{self, RpcError};

const STDIO_SESSION: &str = "stdio";

enum Line {
    Message(Vec<u8>),
    Oversized,
    Eof,
}

pub(super) async fn serve<R, W, F>(
    server: Arc<McpServer>,
    reader: R,
    writer: W,
    buffer_size: usize,
    shutdown: F,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let (tx, rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);
    let session = server.new_session(STDIO_SESSION, tx).with_unattributed_logs();
    server.register(session.clone());
    let writer_task = tokio::spawn(write_loop(writer, rx));
    info!(buffer_size, "Serving MCP over stdio");

    let mut reader = BufReader::with_capacity(buffer_size, reader);
    let mut handlers = JoinSet::new();
    let mut shutting_down = false;
    tokio::pin!(shutdown);

    let result = loop {
        let line = tokio::select! {
            _ = &mut shutdown => {
                shutting_down = true;
                break Ok(());
            }
            line = read_line(&mut reader, buffer_size) => line,
        };

        let bytes = match line {
            Ok(Line::Eof) => break Ok(()),
            Ok(Line::Oversized) => {
                warn!(buffer_size, "Discarding message larger than the buffer");
                let error = RpcError::parse_error(format!("message exceeds {buffer_size} bytes"));
                session.send(protocol::failure(Value::Null, error)).await;
                continue;
            }
            Ok(Line::Message(bytes)) => bytes,
            Err(err) => break Err(ServerError::Io(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let message: Value = match serde_json::from_slice(&bytes) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "Unparseable input line");
                session.send(protocol::failure(Value::Null, RpcError::parse_error(err))).await;
                continue;
            }
        };

        let server = server.clone();
        let session = session.clone();
        handlers.spawn(async move {
            if let Some(reply) = server.handle_message(message, &session).await {
                session.send(reply).await;
            }
        });
        // reap finished handlers so the set does not grow without bound
        while handlers.try_join_next().is_some() {}
    };

    if shutting_down {
        handlers.abort_all();
    }
    while handlers.join_next().await.is_some() {}

    server.unregister(STDIO_SESSION);
    drop(session);
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "stdout writer failed"),
        Err(err) => warn!(error = %err, "stdout writer panicked"),
    }
    info!("stdio transport closed");
    result
}

/// Read one line of at most `limit` bytes. Longer lines are consumed and
/// reported as oversized.
async fn read_line<R>(reader: &mut BufReader<R>, limit: usize) -> std::io::Result<Line>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader).take(limit as u64 + 1).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.ends_with(b"\n") || buf.len() <= limit {
        return Ok(Line::Message(buf));
    }

    // skip the rest of the oversized line
    loop {
        buf.clear();
        let read = (&mut *reader).take(limit as u64).read_until(b'\n', &mut buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            return Ok(Line::Oversized);
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_limits() {
        let input: &[u8] = b"{\"a\":1}\n0123456789abcdef\n{\"b\":2}";
        let mut reader = BufReader::new(input);

        assert!(matches!(read_line(&mut reader, 10).await.unwrap(), Line::Message(m) if m == b"{\"a\":1}\n"));
        assert!(matches!(read_line(&mut reader, 10).await.unwrap(), Line::Oversized));
        assert!(matches!(read_line(&mut reader, 10).await.unwrap(), Line::Message(m) if m == b"{\"b\":2}"));
        assert!(matches!(read_line(&mut reader, 10).await.unwrap(), Line::Eof));
    }
}
