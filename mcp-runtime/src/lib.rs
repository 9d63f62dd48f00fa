//! Session-scoped MCP runtime: handshake enforcement, session table, tool registry and
//! dispatch against the events API.

pub mod dispatch;
pub mod protocol;
pub mod router;
pub mod session;
pub mod store;
pub mod tools;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub const MCP_SERVER_NAME: &str = "evalgate";

pub(crate) const SERVER_INSTRUCTIONS: &str = "Read-only access to event applications, \
evaluations, criteria and questions. Call test_connection first to verify upstream \
connectivity, then tools/list for the available tools and their parameters.";

pub use dispatch::{DispatchError, InvocationResult, ToolDispatcher, ToolFailure};
pub use protocol::{MCP_PROTOCOL_VERSION_LATEST, RpcError, SUPPORTED_PROTOCOL_VERSIONS};
pub use router::{RouteError, RoutedReply, SessionRouter};
pub use session::{CloseReason, SessionContext, SessionEvent};
pub use store::{DEFAULT_SESSION_IDLE_TTL, Session, SessionReaper, SessionStore};
pub use tools::{ToolCall, ToolDescriptor, ToolKind, ToolRegistry};
pub use upstream::{ConfigurationFault, HttpUpstreamClient, UpstreamClient, UpstreamConfig, UpstreamError};
