//! Newline-delimited JSON-RPC over process stdin/stdout
//!
//! Used when no port is configured: a single implicit session lives for as long as the
//! input stays open.

use futures::StreamExt;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    backend::BackendFactory,
    errors::TransportError,
    mcp::rpc::parse_error,
    session::{Session, StreamRelease, TransportKind},
};

pub async fn serve_stdio(
    backend: &dyn BackendFactory,
    shutdown: &CancellationToken,
) -> Result<(), TransportError> {
    serve_lines(backend, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serves one session over a line-oriented reader/writer pair until the reader hits EOF
/// or `shutdown` fires.
pub async fn serve_lines<R, W>(
    backend: &dyn BackendFactory,
    reader: R,
    writer: W,
    shutdown: &CancellationToken,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (session, transport) = Session::open("stdio".into(), TransportKind::Stdio, shutdown);
    let mut outbound = session
        .take_stream(StreamRelease::Return)
        .ok_or_else(|| TransportError::Closed(session.id().clone()))?;

    backend.connect(transport, false).await?;
    info!("serving mcp over stdio");

    let writer = Mutex::new(writer);

    let read_loop = async {
        let mut lines = BufReader::new(reader).lines();
        let result = loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = session.closed() => break Ok(()),
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(err) => break Err(TransportError::from(err)),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<Value>(line) {
                Ok(payload) => match session.dispatch(payload).await {
                    Ok(reply) => reply,
                    Err(err) => break Err(err),
                },
                Err(_) => Some(parse_error()),
            };

            if let Some(reply) = reply {
                if let Err(err) = write_line(&writer, &reply).await {
                    break Err(err);
                }
            }
        };

        debug!("stdio input finished");
        session.close();
        result
    };

    let write_loop = async {
        while let Some(message) = outbound.next().await {
            write_line(&writer, &message).await?;
        }
        Ok::<(), TransportError>(())
    };

    let (read_result, write_result) = tokio::join!(read_loop, write_loop);
    read_result.and(write_result)
}

async fn write_line<W>(writer: &Mutex<W>, message: &Value) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    bytes.push(b'\n');

    let mut writer = writer.lock().await;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
