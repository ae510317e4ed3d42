//! A sample GGP player that always answers NOOP. It is not meant to be
//! a sensible player; it shows how little code a player needs on top of
//! the [`SimplePlayer`] surface, and it is handy as a stand-in opponent
//! when testing a game master setup.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ggp_player::core::Deadline;
use ggp_player::network::{
    GgpHandler, MatchStart, PlayerServer, ServerConfig, SimplePlayer, SimpleSeesPlayer,
};

#[derive(Parser, Debug)]
#[command(name = "noop-player", about = "NOOP GGP player", version)]
struct Args {
    /// Listener host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// GGP player port
    #[arg(long, default_value_t = 4001)]
    port: u16,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "debug")]
    log_level: String,

    /// Speak GDL-II (observation payloads) instead of GDL-I
    #[arg(long)]
    gdl2: bool,
}

struct NoopPlayer;

/// Margin kept between answering and the master's clock expiring.
const RESPONSE_MARGIN: Duration = Duration::from_millis(1500);

fn select_noop(mut deadline: Deadline) -> String {
    deadline.reduce(RESPONSE_MARGIN);
    info!(
        remaining = ?deadline.remaining(),
        "selecting a move (spoiler: it is NOOP)"
    );
    "NOOP".to_string()
}

impl SimplePlayer for NoopPlayer {
    fn on_start(&mut self, _deadline: Deadline, start: &MatchStart) {
        info!(match_id = %start.match_id, role = %start.role, "match started");
    }

    fn on_update(&mut self, moves: &[(String, String)]) {
        info!(?moves, "updating actions");
    }

    fn on_select(&mut self, deadline: Deadline) -> String {
        select_noop(deadline)
    }

    fn on_clear(&mut self) {
        info!("clearing game state");
    }
}

impl SimpleSeesPlayer for NoopPlayer {
    fn on_start(&mut self, _deadline: Deadline, start: &MatchStart) {
        info!(match_id = %start.match_id, role = %start.role, "match started");
    }

    fn on_update(&mut self, last_move: Option<&str>, sees: &[String]) {
        info!(?last_move, ?sees, "updating observations");
    }

    fn on_select(&mut self, deadline: Deadline) -> String {
        select_noop(deadline)
    }

    fn on_clear(&mut self) {
        info!("clearing game state");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    let handler = if args.gdl2 {
        GgpHandler::simple_sees(NoopPlayer)
    } else {
        GgpHandler::simple(NoopPlayer)
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };
    PlayerServer::new(config, handler).run().await
}
