//! Session Manager module
//!
//! Starts LoopSessions on background tasks and reports their status.

mod session_manager;

pub use session_manager::{SessionHandle, SessionManager};
