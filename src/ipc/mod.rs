//! Session transport - Unix socket access to a gateway
//!
//! This module provides:
//! - Message types for requests and responses
//! - Newline-delimited JSON codec
//! - `GatewayServer`, which fronts a `Gateway`
//! - `GatewayClient`, a `ToolGateway` backed by the socket

pub mod client;
pub mod codec;
pub mod messages;
pub mod server;

pub use client::{GatewayClient, GatewayClientConfig};
pub use codec::{Frame, NdJsonCodec};
pub use messages::{ErrorCode, GatewayError, GatewayRequest, GatewayResponse, Methods};
pub use server::{GatewayServer, GatewayServerConfig, default_socket_path};
