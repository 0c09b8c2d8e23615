//! Tool gateway: authenticated sessions over a typed tool catalog
//!
//! - auth: pre-shared credential, stored as a digest
//! - dispatch: `Gateway` / `GatewayBuilder`, lookup, validation, timeout, error mapping
//! - session: `GatewaySession` and the `ToolGateway` trait the loop consumes

mod auth;
mod dispatch;
mod session;

pub use auth::Credential;
pub use dispatch::{DEFAULT_TOOL_TIMEOUT, Gateway, GatewayBuilder};
pub use session::{GatewaySession, ToolGateway};
