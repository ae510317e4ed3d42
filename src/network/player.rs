//! Player Callback Surface
//!
//! Two levels of API. The raw traits ([`TurnPlayer`], [`SeesPlayer`])
//! mirror the protocol one-to-one: one callback per message kind, with
//! the deadline threaded through. The simplified traits
//! ([`SimplePlayer`], [`SimpleSeesPlayer`]) separate updating the game
//! state from selecting a move, which is closer to how game-playing
//! engines are actually structured, and derive the raw callbacks
//! mechanically.
//!
//! A player implements exactly one move-selection surface. Which one it
//! is decides the GDL variant: [`TurnPlayer`] speaks GDL-I joint-action
//! payloads, [`SeesPlayer`] speaks GDL-II turn/lastmove/observation
//! payloads.

use crate::core::Deadline;

/// Everything a START message tells the player about the new match.
#[derive(Debug, Clone)]
pub struct MatchStart {
    /// Match identifier, opaque to the player.
    pub match_id: String,
    /// The role assigned to this player.
    pub role: String,
    /// Raw GDL rules text, outer parentheses stripped.
    pub gdl: String,
    /// Seconds granted for match initialization.
    pub start_clock: u64,
    /// Seconds granted per move thereafter.
    pub play_clock: u64,
}

/// Callbacks shared by both GDL variants.
///
/// Deadlines are handed out by value; reduce them to leave a response
/// margin before the game master's clock runs out.
pub trait GamePlayer: Send {
    /// A match has been offered and accepted. Initialize within the
    /// start clock.
    fn on_start(&mut self, deadline: Deadline, start: &MatchStart);

    /// The match was torn down, either by an ABORT message or because a
    /// mismatched identifier forced a reset. Discard match state.
    fn on_abort(&mut self);

    /// Liveness probe. Return `Some` to override the default
    /// AVAILABLE/BUSY response; the returned text must be non-empty.
    fn on_info(&mut self) -> Option<String> {
        None
    }

    /// A match may be offered soon; the rules are attached for early
    /// analysis. Default does nothing.
    fn on_preview(&mut self, _deadline: Deadline, _gdl: &str) {}
}

/// Move selection for GDL-I matches.
pub trait TurnPlayer: GamePlayer {
    /// A turn has begun. `moves` pairs each role with the action it
    /// took last turn, in rules declaration order; it is empty on the
    /// first turn. Return this player's move within the deadline.
    fn on_play(&mut self, deadline: Deadline, moves: &[(String, String)]) -> String;

    /// The match reached a terminal state; `moves` carries the final
    /// joint actions.
    fn on_stop(&mut self, deadline: Deadline, moves: &[(String, String)]);
}

/// Move selection for GDL-II matches, where a player only sees its own
/// last move plus whatever observations the rules grant it.
pub trait SeesPlayer: GamePlayer {
    /// A turn has begun. Return this player's move within the deadline.
    fn on_play(
        &mut self,
        deadline: Deadline,
        last_move: Option<&str>,
        sees: &[String],
    ) -> String;

    /// The match reached a terminal state.
    fn on_stop(&mut self, deadline: Deadline, last_move: Option<&str>, sees: &[String]);
}

/// The player attached to a handler, tagged with its GDL variant.
///
/// Exactly one variant is in force for the lifetime of the handler; the
/// match state machine uses the tag to decide how PLAY/STOP payloads are
/// decoded.
pub enum PlayerHooks {
    /// A GDL-I player.
    Standard(Box<dyn TurnPlayer>),
    /// A GDL-II player.
    ImperfectInformation(Box<dyn SeesPlayer>),
}

impl PlayerHooks {
    pub(crate) fn on_start(&mut self, deadline: Deadline, start: &MatchStart) {
        match self {
            PlayerHooks::Standard(player) => player.on_start(deadline, start),
            PlayerHooks::ImperfectInformation(player) => player.on_start(deadline, start),
        }
    }

    pub(crate) fn on_abort(&mut self) {
        match self {
            PlayerHooks::Standard(player) => player.on_abort(),
            PlayerHooks::ImperfectInformation(player) => player.on_abort(),
        }
    }

    pub(crate) fn on_info(&mut self) -> Option<String> {
        match self {
            PlayerHooks::Standard(player) => player.on_info(),
            PlayerHooks::ImperfectInformation(player) => player.on_info(),
        }
    }

    pub(crate) fn on_preview(&mut self, deadline: Deadline, gdl: &str) {
        match self {
            PlayerHooks::Standard(player) => player.on_preview(deadline, gdl),
            PlayerHooks::ImperfectInformation(player) => player.on_preview(deadline, gdl),
        }
    }
}

/// Simplified GDL-I player: state updates and move selection are
/// separate concerns.
pub trait SimplePlayer: Send {
    /// Match setup. Default does nothing.
    fn on_start(&mut self, _deadline: Deadline, _start: &MatchStart) {}

    /// Advance the game state by one joint move. Never called with an
    /// empty move list.
    fn on_update(&mut self, moves: &[(String, String)]);

    /// Pick this player's move within the deadline.
    fn on_select(&mut self, deadline: Deadline) -> String;

    /// Discard match state at the end of a match or on abort.
    fn on_clear(&mut self) {}

    /// Optional liveness override, see [`GamePlayer::on_info`].
    fn on_info(&mut self) -> Option<String> {
        None
    }

    /// Optional rules preview, see [`GamePlayer::on_preview`].
    fn on_preview(&mut self, _deadline: Deadline, _gdl: &str) {}
}

/// Simplified GDL-II player.
pub trait SimpleSeesPlayer: Send {
    /// Match setup. Default does nothing.
    fn on_start(&mut self, _deadline: Deadline, _start: &MatchStart) {}

    /// Advance the game state by this player's last move and its
    /// observations for the turn.
    fn on_update(&mut self, last_move: Option<&str>, sees: &[String]);

    /// Pick this player's move within the deadline.
    fn on_select(&mut self, deadline: Deadline) -> String;

    /// Discard match state at the end of a match or on abort.
    fn on_clear(&mut self) {}

    /// Optional liveness override, see [`GamePlayer::on_info`].
    fn on_info(&mut self) -> Option<String> {
        None
    }

    /// Optional rules preview, see [`GamePlayer::on_preview`].
    fn on_preview(&mut self, _deadline: Deadline, _gdl: &str) {}
}

/// Derives the raw [`TurnPlayer`] callbacks from a [`SimplePlayer`].
pub(crate) struct SimplePlayerAdapter<P>(pub(crate) P);

impl<P: SimplePlayer> GamePlayer for SimplePlayerAdapter<P> {
    fn on_start(&mut self, deadline: Deadline, start: &MatchStart) {
        self.0.on_start(deadline, start);
    }

    fn on_abort(&mut self) {
        self.0.on_clear();
    }

    fn on_info(&mut self) -> Option<String> {
        self.0.on_info()
    }

    fn on_preview(&mut self, deadline: Deadline, gdl: &str) {
        self.0.on_preview(deadline, gdl);
    }
}

impl<P: SimplePlayer> TurnPlayer for SimplePlayerAdapter<P> {
    fn on_play(&mut self, deadline: Deadline, moves: &[(String, String)]) -> String {
        // The first turn carries no moves to apply.
        if !moves.is_empty() {
            self.0.on_update(moves);
        }
        self.0.on_select(deadline)
    }

    fn on_stop(&mut self, _deadline: Deadline, moves: &[(String, String)]) {
        if !moves.is_empty() {
            self.0.on_update(moves);
        }
        self.0.on_clear();
    }
}

/// Derives the raw [`SeesPlayer`] callbacks from a [`SimpleSeesPlayer`].
pub(crate) struct SimpleSeesPlayerAdapter<P>(pub(crate) P);

impl<P: SimpleSeesPlayer> GamePlayer for SimpleSeesPlayerAdapter<P> {
    fn on_start(&mut self, deadline: Deadline, start: &MatchStart) {
        self.0.on_start(deadline, start);
    }

    fn on_abort(&mut self) {
        self.0.on_clear();
    }

    fn on_info(&mut self) -> Option<String> {
        self.0.on_info()
    }

    fn on_preview(&mut self, deadline: Deadline, gdl: &str) {
        self.0.on_preview(deadline, gdl);
    }
}

impl<P: SimpleSeesPlayer> SeesPlayer for SimpleSeesPlayerAdapter<P> {
    fn on_play(
        &mut self,
        deadline: Deadline,
        last_move: Option<&str>,
        sees: &[String],
    ) -> String {
        self.0.on_update(last_move, sees);
        self.0.on_select(deadline)
    }

    fn on_stop(&mut self, _deadline: Deadline, last_move: Option<&str>, sees: &[String]) {
        self.0.on_update(last_move, sees);
        self.0.on_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        updates: Vec<usize>,
        selects: usize,
        cleared: bool,
    }

    impl SimplePlayer for Recorder {
        fn on_update(&mut self, moves: &[(String, String)]) {
            self.updates.push(moves.len());
        }

        fn on_select(&mut self, _deadline: Deadline) -> String {
            self.selects += 1;
            "noop".to_string()
        }

        fn on_clear(&mut self) {
            self.cleared = true;
        }
    }

    fn deadline() -> Deadline {
        Deadline::new(Instant::now(), 5)
    }

    #[test]
    fn test_first_turn_skips_update() {
        let mut adapter = SimplePlayerAdapter(Recorder::default());
        let selected = adapter.on_play(deadline(), &[]);
        assert_eq!(selected, "noop");
        let recorder = &adapter.0;
        assert!(recorder.updates.is_empty());
        assert_eq!(recorder.selects, 1);
    }

    #[test]
    fn test_later_turns_update_then_select() {
        let mut adapter = SimplePlayerAdapter(Recorder::default());
        let moves = vec![
            ("x".to_string(), "noop".to_string()),
            ("o".to_string(), "(mark 1 1)".to_string()),
        ];
        adapter.on_play(deadline(), &moves);
        assert_eq!(adapter.0.updates, vec![2]);
        assert_eq!(adapter.0.selects, 1);
    }

    #[test]
    fn test_stop_updates_and_clears() {
        let mut adapter = SimplePlayerAdapter(Recorder::default());
        let moves = vec![("x".to_string(), "noop".to_string())];
        adapter.on_stop(deadline(), &moves);
        assert_eq!(adapter.0.updates, vec![1]);
        assert_eq!(adapter.0.selects, 0);
        assert!(adapter.0.cleared);
    }

    #[test]
    fn test_abort_clears() {
        let mut adapter = SimplePlayerAdapter(Recorder::default());
        adapter.on_abort();
        assert!(adapter.0.cleared);
    }
}
