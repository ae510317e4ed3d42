//! Network layer: protocol grammar, admission ordering, match state,
//! player callbacks, and the HTTP transport that fronts them.

pub mod handler;
pub mod player;
pub mod protocol;
pub(crate) mod sequencer;
pub mod server;
pub mod session;

// Re-export the surface a player implementation touches
pub use handler::GgpHandler;
pub use player::{
    GamePlayer, MatchStart, PlayerHooks, SeesPlayer, SimplePlayer, SimpleSeesPlayer, TurnPlayer,
};
pub use protocol::{Message, MessageKind, ProtocolError, ResponseCase, SeesPayload};
pub use server::{PlayerServer, ServerConfig};
pub use session::MatchSession;
