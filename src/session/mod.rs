//! Per-session state shared between the HTTP adapters and a protocol engine
//!
//! A [`Session`] is the registry-side handle of one client conversation. Its engine-side
//! counterpart is a [`SessionTransport`], handed to the backend factory exactly once when
//! the session is established.

pub mod registry;

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::errors::TransportError;

pub use registry::{SessionRegistry, Sessions};

pub type SessionId = Arc<str>;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sse,
    Streamable,
    Stdio,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sse => "sse",
            Self::Streamable => "streamable",
            Self::Stdio => "stdio",
        })
    }
}

/// Source of the id a new session is registered under.
#[derive(Debug, Clone)]
pub enum SessionIdGenerator {
    Random,
    /// Always yields the given id, used when a client resumes with an id we have not seen.
    Fixed(SessionId),
}

impl SessionIdGenerator {
    pub fn generate(&self) -> SessionId {
        match self {
            Self::Random => random_session_id(),
            Self::Fixed(id) => id.clone(),
        }
    }
}

pub fn random_session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string().into()
}

/// One client-to-engine message. Messages carrying a reply slot expect the engine's
/// answer on it; all others are answered on the session's outbound channel.
#[derive(Debug)]
pub struct InboundMessage {
    payload: Value,
    reply: Option<oneshot::Sender<Option<Value>>>,
}

impl InboundMessage {
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    kind: TransportKind,
    created_at: DateTime<Utc>,
    initialized: AtomicBool,
    inbound: mpsc::Sender<InboundMessage>,
    outbound: Mutex<Option<mpsc::Receiver<Value>>>,
    closed: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("created_at", &self.inner.created_at)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Allocates the channels of a new session. The session closes when `parent` is
    /// cancelled, when [`Session::close`] is called, or when the transport is dropped.
    pub fn open(
        id: SessionId,
        kind: TransportKind,
        parent: &CancellationToken,
    ) -> (Session, SessionTransport) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let closed = parent.child_token();

        let session = Session {
            inner: Arc::new(SessionInner {
                id: id.clone(),
                kind,
                created_at: Utc::now(),
                initialized: AtomicBool::new(false),
                inbound: inbound_tx,
                outbound: Mutex::new(Some(outbound_rx)),
                closed: closed.clone(),
            }),
        };
        let transport = SessionTransport {
            session_id: id,
            kind,
            inbound: inbound_rx,
            outbound: outbound_tx,
            closed,
        };

        (session, transport)
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub fn mark_initialized(&self) {
        self.inner.initialized.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    /// Resolves once the session has closed for any reason.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.inner.closed.clone().cancelled_owned()
    }

    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Hands a message to the engine without waiting for its answer.
    pub async fn deliver(&self, payload: Value) -> Result<(), TransportError> {
        self.send(InboundMessage {
            payload,
            reply: None,
        })
        .await
    }

    /// Hands a message to the engine and waits for its answer. `None` means the engine
    /// had nothing to say, as for notifications.
    pub async fn dispatch(&self, payload: Value) -> Result<Option<Value>, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(InboundMessage {
            payload,
            reply: Some(reply_tx),
        })
        .await?;

        tokio::select! {
            biased;
            reply = reply_rx => reply.map_err(|_| self.closed_error()),
            _ = self.inner.closed.cancelled() => Err(self.closed_error()),
        }
    }

    /// Takes the server-to-client stream. `None` while another stream is attached.
    pub fn take_stream(&self, release: StreamRelease) -> Option<OutboundStream> {
        let receiver = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        Some(OutboundStream {
            receiver: Some(receiver),
            session: self.clone(),
            closed: Box::pin(self.closed()),
            release,
        })
    }

    async fn send(&self, message: InboundMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.inner
            .inbound
            .send(message)
            .await
            .map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> TransportError {
        TransportError::Closed(self.inner.id.clone())
    }
}

/// What happens to a session when its attached outbound stream is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRelease {
    /// The stream is the session's connection: dropping it closes the session.
    CloseSession,
    /// The receiver goes back to the session so a later request can reattach.
    Return,
}

/// Server-to-client messages of one session.
///
/// Buffered messages are drained before the stream ends, so output produced right
/// before the engine shuts down still reaches the client.
pub struct OutboundStream {
    receiver: Option<mpsc::Receiver<Value>>,
    session: Session,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
    release: StreamRelease,
}

impl Stream for OutboundStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(None);
        };

        match receiver.poll_recv(cx) {
            Poll::Ready(message) => Poll::Ready(message),
            Poll::Pending => match this.closed.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for OutboundStream {
    fn drop(&mut self) {
        match self.release {
            StreamRelease::CloseSession => self.session.close(),
            StreamRelease::Return => {
                if let Some(receiver) = self.receiver.take() {
                    *self
                        .session
                        .inner
                        .outbound
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(receiver);
                }
            }
        }
    }
}

/// Engine-side end of a session, handed to [`crate::backend::BackendFactory::connect`].
///
/// Dropping the transport closes the session.
pub struct SessionTransport {
    session_id: SessionId,
    kind: TransportKind,
    inbound: mpsc::Receiver<InboundMessage>,
    outbound: mpsc::Sender<Value>,
    closed: CancellationToken,
}

impl fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTransport")
            .field("session_id", &self.session_id)
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionTransport {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Next client message, or `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            message = self.inbound.recv() => message,
        }
    }

    /// Answers `message`: through its reply slot when it has one, otherwise by pushing
    /// the response on the outbound channel.
    pub async fn respond(
        &self,
        message: InboundMessage,
        response: Option<Value>,
    ) -> Result<(), TransportError> {
        match message.reply {
            // the requester may have gone away; that is not a transport failure
            Some(reply) => {
                let _ = reply.send(response);
                Ok(())
            }
            None => match response {
                Some(response) => self.push(response).await,
                None => Ok(()),
            },
        }
    }

    /// Sends a server-initiated message to the client.
    pub async fn push(&self, message: Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.session_id.clone()));
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| TransportError::Closed(self.session_id.clone()))
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
