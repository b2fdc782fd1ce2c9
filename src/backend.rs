use async_trait::async_trait;
use tracing::debug;

use crate::{
    errors::TransportError,
    mcp::server::{self, McpEngine},
    session::SessionTransport,
};

/// Creates the protocol engine behind each session.
///
/// `connect` is called exactly once per session, when it is established. `stateless`
/// is true for streamable sessions: the engine gets no back-channel outside an active
/// request and must not rely on pushing messages between requests.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(
        &self,
        transport: SessionTransport,
        stateless: bool,
    ) -> Result<(), TransportError>;
}

/// Runs the built-in [`McpEngine`] on a task of its own for every session.
#[derive(Debug, Default)]
pub struct McpBackend;

impl McpBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendFactory for McpBackend {
    async fn connect(
        &self,
        transport: SessionTransport,
        stateless: bool,
    ) -> Result<(), TransportError> {
        if transport.is_closed() {
            return Err(TransportError::Closed(transport.session_id().clone()));
        }

        debug!(session_id = %transport.session_id(), stateless, "connecting engine");
        let engine = McpEngine::new(transport.session_id().clone(), stateless);
        tokio::spawn(server::serve(transport, engine));
        Ok(())
    }
}
