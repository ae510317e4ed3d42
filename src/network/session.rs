//! Match Session State Machine
//!
//! One [`MatchSession`] tracks at most one active match: its identifier,
//! the roles in rules declaration order, the play clock, and (for
//! GDL-II) the turn counter. Messages are applied one at a time by the
//! admission layer, so the state machine itself is single-threaded and
//! synchronous.
//!
//! The defensive posture throughout is "the game master is buggy, the
//! player must not be": malformed payloads are client errors, identifier
//! mismatches force an abort so the player never reasons about a stale
//! match, and invalid moves returned by the player are patched up rather
//! than dropped on the floor.

use std::time::Instant;
use tracing::{debug, error, warn};

use crate::core::sexpr;
use crate::core::Deadline;
use crate::network::player::{MatchStart, PlayerHooks};
use crate::network::protocol::{
    self, keyword_case, Message, MessageKind, ProtocolError, ResponseCase,
};

/// State for the match currently in progress.
struct ActiveMatch {
    match_id: String,
    /// Roles in GDL declaration order; PLAY/STOP actions are positional
    /// against this list.
    roles: Vec<String>,
    play_clock: u64,
    /// GDL-II turn counter; next turn number the master must send.
    turn: u32,
}

/// The per-player protocol state machine.
pub struct MatchSession {
    active: Option<ActiveMatch>,
    response_case: ResponseCase,
}

impl Default for MatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchSession {
    /// A fresh idle session. Responses default to upper case until a
    /// message reveals the master's preference.
    pub fn new() -> Self {
        Self {
            active: None,
            response_case: ResponseCase::Upper,
        }
    }

    /// The identifier of the match in progress, if any.
    pub fn active_match_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.match_id.as_str())
    }

    /// Apply one message and produce the response body.
    ///
    /// `arrived_at` is the instant the transport first saw the request;
    /// all clock deadlines are anchored to it, not to the (possibly much
    /// later) instant admission granted this message its turn.
    pub fn handle(
        &mut self,
        arrived_at: Instant,
        text: &str,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        debug!(message = %truncate(text), "game master message");
        let kind = MessageKind::recognize(text)
            .ok_or_else(|| ProtocolError::Unrecognized(text.to_string()))?;

        // Replies mirror the master's keyword case. PLAY/STOP are
        // excluded: their responses are move text, and mid-match
        // messages must not flip the case chosen at START.
        if matches!(
            kind,
            MessageKind::Start | MessageKind::Info | MessageKind::Abort | MessageKind::Preview
        ) {
            self.response_case = keyword_case(text, kind);
        }

        match Message::extract(kind, text)? {
            Message::Start {
                match_id,
                role,
                gdl,
                start_clock,
                play_clock,
            } => self.handle_start(arrived_at, match_id, role, gdl, start_clock, play_clock, hooks),
            Message::Play { match_id, payload } => {
                self.handle_play(arrived_at, &match_id, &payload, hooks)
            }
            Message::Stop { match_id, payload } => {
                self.handle_stop(arrived_at, &match_id, &payload, hooks)
            }
            Message::Info => self.handle_info(hooks),
            Message::Abort { match_id } => self.handle_abort(&match_id, hooks),
            Message::Preview { gdl, preview_clock } => {
                self.handle_preview(arrived_at, &gdl, preview_clock, hooks)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_start(
        &mut self,
        arrived_at: Instant,
        match_id: String,
        role: String,
        gdl: String,
        start_clock: u64,
        play_clock: u64,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        let roles = match protocol::roles_in_declaration_order(&gdl) {
            Ok(roles) => roles,
            Err(err) => {
                // An unusable game is declined silently: empty 200 body,
                // no match started.
                error!(%err, "GDL error, ignoring this game");
                self.active = None;
                return Ok(String::new());
            }
        };

        let deadline = Deadline::new(arrived_at, start_clock);
        let start = MatchStart {
            match_id: match_id.clone(),
            role,
            gdl,
            start_clock,
            play_clock,
        };
        self.active = Some(ActiveMatch {
            match_id,
            roles,
            play_clock,
            turn: 0,
        });
        hooks.on_start(deadline.clone(), &start);
        log_response_latency(MessageKind::Start, &deadline);

        Ok(self.response_case.render("READY"))
    }

    fn handle_play(
        &mut self,
        arrived_at: Instant,
        match_id: &str,
        payload: &str,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        let mut active = self.take_match(MessageKind::Play, match_id, hooks)?;
        let outcome = run_play(arrived_at, &mut active, payload, hooks);
        // A bad payload is the master's problem, not the match's.
        self.active = Some(active);
        outcome
    }

    fn handle_stop(
        &mut self,
        arrived_at: Instant,
        match_id: &str,
        payload: &str,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        let mut active = self.take_match(MessageKind::Stop, match_id, hooks)?;
        match run_stop(arrived_at, &mut active, payload, hooks) {
            Ok(()) => Ok(self.response_case.render("DONE")),
            Err(err) => {
                self.active = Some(active);
                Err(err)
            }
        }
    }

    fn handle_info(&mut self, hooks: &mut PlayerHooks) -> Result<String, ProtocolError> {
        let response = match hooks.on_info() {
            Some(text) if text.is_empty() => return Err(ProtocolError::EmptyInfoResponse),
            Some(text) => text,
            None => {
                if self.active.is_some() { "BUSY" } else { "AVAILABLE" }.to_string()
            }
        };
        Ok(self.response_case.render(&response))
    }

    fn handle_abort(
        &mut self,
        match_id: &str,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        self.take_match(MessageKind::Abort, match_id, hooks)?;
        hooks.on_abort();
        // The Stanford test site expects ABORTED even though the written
        // protocol says DONE.
        Ok(self.response_case.render("ABORTED"))
    }

    fn handle_preview(
        &mut self,
        arrived_at: Instant,
        gdl: &str,
        preview_clock: u64,
        hooks: &mut PlayerHooks,
    ) -> Result<String, ProtocolError> {
        hooks.on_preview(Deadline::new(arrived_at, preview_clock), gdl);
        Ok(self.response_case.render("DONE"))
    }

    /// Remove and return the active match if `got` names it. On a
    /// mismatch the match (if any) is torn down: the player's abort hook
    /// fires so it never keeps reasoning about a match the master has
    /// moved on from.
    fn take_match(
        &mut self,
        kind: MessageKind,
        got: &str,
        hooks: &mut PlayerHooks,
    ) -> Result<ActiveMatch, ProtocolError> {
        match self.active.take() {
            Some(active) if active.match_id == got => Ok(active),
            other => {
                let active_id = other.map(|active| active.match_id);
                warn!(kind = %kind, got, active = ?active_id, "match id mismatch, aborting");
                hooks.on_abort();
                Err(ProtocolError::MatchIdMismatch {
                    kind,
                    got: got.to_string(),
                    active: active_id,
                })
            }
        }
    }
}

fn run_play(
    arrived_at: Instant,
    active: &mut ActiveMatch,
    payload: &str,
    hooks: &mut PlayerHooks,
) -> Result<String, ProtocolError> {
    let deadline = Deadline::new(arrived_at, active.play_clock);
    let selected = match hooks {
        PlayerHooks::Standard(player) => {
            let moves = decode_joint_moves(MessageKind::Play, active, payload, false)?;
            player.on_play(deadline.clone(), &moves)
        }
        PlayerHooks::ImperfectInformation(player) => {
            let sees = protocol::parse_sees_payload(MessageKind::Play, payload)?;
            check_turn(MessageKind::Play, active, sees.turn)?;
            player.on_play(deadline.clone(), sees.last_move.as_deref(), &sees.sees)
        }
    };
    let selected = normalize_selected_move(selected);
    log_response_latency(MessageKind::Play, &deadline);
    Ok(selected)
}

fn run_stop(
    arrived_at: Instant,
    active: &mut ActiveMatch,
    payload: &str,
    hooks: &mut PlayerHooks,
) -> Result<(), ProtocolError> {
    let deadline = Deadline::new(arrived_at, active.play_clock);
    match hooks {
        PlayerHooks::Standard(player) => {
            let moves = decode_joint_moves(MessageKind::Stop, active, payload, true)?;
            player.on_stop(deadline.clone(), &moves);
        }
        PlayerHooks::ImperfectInformation(player) => {
            let sees = protocol::parse_sees_payload(MessageKind::Stop, payload)?;
            check_turn(MessageKind::Stop, active, sees.turn)?;
            player.on_stop(deadline.clone(), sees.last_move.as_deref(), &sees.sees);
        }
    }
    log_response_latency(MessageKind::Stop, &deadline);
    Ok(())
}

/// Decode a GDL-I action payload and pair each action with its role.
/// PLAY tolerates an empty payload (the first turn); STOP does not.
fn decode_joint_moves(
    kind: MessageKind,
    active: &ActiveMatch,
    payload: &str,
    require_full: bool,
) -> Result<Vec<(String, String)>, ProtocolError> {
    let malformed = || ProtocolError::MalformedMessage {
        kind,
        text: payload.to_string(),
    };

    let trimmed = payload.trim();
    let shaped = trimmed.eq_ignore_ascii_case("NIL")
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    if !shaped {
        return Err(malformed());
    }

    let actions = sexpr::parse_action_list(trimmed).map_err(|_| malformed())?;
    let partial_ok = actions.is_empty() && !require_full;
    if !partial_ok && actions.len() != active.roles.len() {
        return Err(malformed());
    }
    Ok(active.roles.iter().cloned().zip(actions).collect())
}

/// GDL-II turn numbers must arrive in lockstep; the counter advances
/// only when the asserted turn is accepted.
fn check_turn(
    kind: MessageKind,
    active: &mut ActiveMatch,
    got: u32,
) -> Result<(), ProtocolError> {
    if got != active.turn {
        return Err(ProtocolError::TurnMismatch {
            kind,
            got,
            expected: active.turn,
        });
    }
    active.turn += 1;
    Ok(())
}

/// The move a player returns must be a well-formed s-expression. When it
/// is not, wrap it in parentheses and hope the master copes; sending
/// something is better than forfeiting the turn.
fn normalize_selected_move(raw: String) -> String {
    if sexpr::parse(raw.trim()).is_ok() {
        return raw;
    }
    let wrapped = format!("({raw})");
    error!(returned = %raw, sending = %wrapped, "invalid move from player, trying to recover");
    wrapped
}

fn log_response_latency(kind: MessageKind, deadline: &Deadline) {
    if deadline.has_expired() {
        error!(kind = %kind, "response past the clock deadline");
    } else {
        debug!(kind = %kind, remaining = ?deadline.remaining(), "response within the clock");
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(50) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
