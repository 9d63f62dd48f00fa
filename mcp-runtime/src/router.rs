use evalgate_core::error::{ErrorDetail, codes, rpc_codes};
use evalgate_core::ids::is_well_formed_session_id;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{RpcError, is_initialize_request};
use crate::session::CloseReason;
use crate::store::SessionStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Non-handshake request without a session id.
    #[error("Bad Request: No valid session ID provided")]
    SessionMissing,
    /// Unknown, expired, or already closed session id. The client must re-handshake.
    #[error("Session not found")]
    SessionInvalid { session_id: String },
}

impl RouteError {
    pub fn code(&self) -> &'static str {
        match self {
            RouteError::SessionMissing => codes::SESSION_MISSING,
            RouteError::SessionInvalid { .. } => codes::SESSION_INVALID,
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        let rpc_code = match self {
            RouteError::SessionMissing => rpc_codes::SESSION_MISSING,
            RouteError::SessionInvalid { .. } => rpc_codes::SESSION_INVALID,
        };
        RpcError::new(rpc_code, self.to_string()).with_detail(
            ErrorDetail::new(self.code())
                .with_docs_hint("Send an initialize request without a session id to start a session."),
        )
    }
}

/// What the transport needs to write back for one routed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedReply {
    /// Session the request was served on; `None` when a handshake was rejected.
    pub session_id: Option<String>,
    /// True when this request minted the session; the id must be bound into the response.
    pub created: bool,
    pub responses: Vec<Value>,
}

/// Decides per request whether it is a new handshake, a request for a live session, or invalid.
#[derive(Clone)]
pub struct SessionRouter {
    store: SessionStore,
}

impl SessionRouter {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn route(
        &self,
        session_id: Option<&str>,
        message: Value,
    ) -> Result<RoutedReply, RouteError> {
        match session_id {
            Some(session_id) => self.route_existing(session_id, message).await,
            None => self.route_handshake(message).await,
        }
    }

    async fn route_existing(
        &self,
        session_id: &str,
        message: Value,
    ) -> Result<RoutedReply, RouteError> {
        let invalid = || RouteError::SessionInvalid {
            session_id: session_id.to_string(),
        };
        if !is_well_formed_session_id(session_id) {
            return Err(invalid());
        }
        let session = self.store.lookup(session_id).ok_or_else(invalid)?;
        session.touch();

        let mut context = session.context().await;
        // The session may have been torn down while this request waited its turn.
        if !session.is_open() || context.is_closed() {
            return Err(invalid());
        }
        let responses = context.handle_incoming(message).await;
        session.touch();

        Ok(RoutedReply {
            session_id: Some(session_id.to_string()),
            created: false,
            responses,
        })
    }

    async fn route_handshake(&self, message: Value) -> Result<RoutedReply, RouteError> {
        if !is_initialize_request(&message) {
            return Err(RouteError::SessionMissing);
        }

        let session = self.store.create();
        let (responses, protocol_version) = {
            let mut context = session.context().await;
            let responses = context.handle_incoming(message).await;
            (responses, context.protocol_version())
        };

        let Some(protocol_version) = protocol_version else {
            self.store.remove(session.id());
            tracing::info!(
                event = "mcp_handshake_rejected",
                session_id = %session.id(),
                "MCP handshake rejected; session discarded"
            );
            return Ok(RoutedReply {
                session_id: None,
                created: false,
                responses,
            });
        };

        tracing::info!(
            event = "mcp_handshake_accepted",
            session_id = %session.id(),
            protocol_version = protocol_version,
            "MCP session ready for tool calls"
        );
        Ok(RoutedReply {
            session_id: Some(session.id().to_string()),
            created: true,
            responses,
        })
    }

    /// Client-initiated teardown. The id stops resolving immediately; the context is
    /// closed in the background once any in-flight request on it completes.
    pub fn terminate(&self, session_id: &str) -> Result<(), RouteError> {
        let session = self
            .store
            .lookup(session_id)
            .ok_or_else(|| RouteError::SessionInvalid {
                session_id: session_id.to_string(),
            })?;
        self.store.remove(session_id);
        tokio::spawn(async move {
            session.close(CloseReason::ClientTerminated).await;
        });
        Ok(())
    }
}
