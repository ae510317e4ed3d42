//! # GGP Player Server
//!
//! The server side of the General Game Playing communication protocol:
//! a game master POSTs s-expression messages (START, PLAY, STOP, INFO,
//! ABORT, PREVIEW) over HTTP and the player answers each one within the
//! match clocks. This crate handles the wire protocol, message
//! ordering, and match lifecycle so a player implementation only has to
//! fill in game reasoning behind a small callback trait.
//!
//! ## Architecture
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────┐
//!   │                     PlayerServer                       │
//!   │                  (HTTP, axum fallback)                 │
//!   └───────────────────────────┬────────────────────────────┘
//!                               │ request body + arrival time
//!   ┌───────────────────────────▼────────────────────────────┐
//!   │                      GgpHandler                        │
//!   │        all-queue ─► goodness test ─► good-queue        │
//!   └───────────────────────────┬────────────────────────────┘
//!                               │ one message at a time
//!   ┌───────────────────────────▼────────────────────────────┐
//!   │                     MatchSession                       │
//!   │     classify ─► extract ─► validate ─► player hook     │
//!   └───────────────────────────┬────────────────────────────┘
//!                               │ deadline + decoded payload
//!   ┌───────────────────────────▼────────────────────────────┐
//!   │        TurnPlayer (GDL-I) / SeesPlayer (GDL-II)        │
//!   └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ggp_player::core::Deadline;
//! use ggp_player::network::{GgpHandler, PlayerServer, ServerConfig, SimplePlayer};
//!
//! struct Legal;
//!
//! impl SimplePlayer for Legal {
//!     fn on_update(&mut self, _moves: &[(String, String)]) {}
//!
//!     fn on_select(&mut self, mut deadline: Deadline) -> String {
//!         deadline.reduce(std::time::Duration::from_millis(1500));
//!         // ...search until the deadline...
//!         "noop".to_string()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = PlayerServer::new(ServerConfig::default(), GgpHandler::simple(Legal));
//!     server.run().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;

// Re-export commonly used types
pub use crate::core::{Deadline, SExpr, SexprError};
pub use network::{
    GamePlayer, GgpHandler, MatchStart, PlayerServer, ProtocolError, SeesPlayer, ServerConfig,
    SimplePlayer, SimpleSeesPlayer, TurnPlayer,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
