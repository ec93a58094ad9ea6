//! Control channel subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator (WebSocket)
//!     → client.rs (connect, receive loop, reconnect forever)
//!     → messages.rs (decode tagged JSON frame)
//!     → handler.rs (event → open/close session on the store)
//!     → client.rs (send ProxyConfigurationReport back, best-effort)
//! ```
//!
//! # Design Decisions
//! - The store is independent of channel state: routes keep serving while
//!   the channel is down
//! - Delivery is at-least-once; handlers are idempotent

pub mod client;
pub mod handler;
pub mod messages;

pub use client::{ChannelState, ControlChannelClient, ControlError};
pub use handler::{HandlerError, HandlerOutcome, SessionHandler};
pub use messages::{InboundMessage, OutboundMessage, SessionEvent};
