//! Message Classification & Extraction
//!
//! Recognition and field extraction for the six GGP message kinds.
//! Classification is a two-step discipline: a cheap case-insensitive
//! prefix test picks the kind, then a full structural pattern extracts
//! the fields. Text that passes recognition but fails the structural
//! match is a client error, never a crash.
//!
//! Game masters in the wild disagree on keyword casing, so the
//! classifier also records whether the recognized keyword arrived in
//! upper or lower case and the player mirrors that case in replies.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::fmt;
use tracing::warn;

use crate::core::sexpr::{self, SExpr, SexprError};

/// The six GGP message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Match setup: id, role, rules, clocks.
    Start,
    /// A turn: joint actions in, selected move out.
    Play,
    /// Terminal turn carrying the final actions.
    Stop,
    /// Liveness probe.
    Info,
    /// Match torn down by the master.
    Abort,
    /// Rules preview ahead of a match offer.
    Preview,
}

impl MessageKind {
    /// The protocol keyword, upper case.
    pub fn keyword(&self) -> &'static str {
        match self {
            MessageKind::Start => "START",
            MessageKind::Play => "PLAY",
            MessageKind::Stop => "STOP",
            MessageKind::Info => "INFO",
            MessageKind::Abort => "ABORT",
            MessageKind::Preview => "PREVIEW",
        }
    }

    /// Classify raw text by its leading keyword, case-insensitively.
    /// Returns `None` for non-GGP text.
    pub fn recognize(text: &str) -> Option<MessageKind> {
        const ALL: [MessageKind; 6] = [
            MessageKind::Start,
            MessageKind::Play,
            MessageKind::Stop,
            MessageKind::Info,
            MessageKind::Abort,
            MessageKind::Preview,
        ];
        ALL.into_iter()
            .find(|kind| RECOGNIZERS[*kind as usize].is_match(text))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// The keyword case style used by the game master, mirrored in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCase {
    /// `READY`, `DONE`, ...
    Upper,
    /// `ready`, `done`, ...
    Lower,
}

impl ResponseCase {
    /// Render a protocol token in this case style.
    pub fn render(&self, token: &str) -> String {
        match self {
            ResponseCase::Upper => token.to_uppercase(),
            ResponseCase::Lower => token.to_lowercase(),
        }
    }
}

/// A fully extracted GGP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `(START <matchid> <role> (<gdl...>) <startclock> <playclock>)`
    Start {
        /// Match identifier for the whole match lifetime.
        match_id: String,
        /// The role this player has been assigned.
        role: String,
        /// Raw GDL rules text, outer parentheses stripped.
        gdl: String,
        /// Seconds allowed for match initialization.
        start_clock: u64,
        /// Seconds allowed per move.
        play_clock: u64,
    },
    /// `(PLAY <matchid> <payload>)`
    Play {
        /// Match identifier, validated against the active session.
        match_id: String,
        /// Action list, or turn/lastmove/observations for GDL-II.
        payload: String,
    },
    /// `(STOP <matchid> <payload>)`
    Stop {
        /// Match identifier, validated against the active session.
        match_id: String,
        /// Final action payload, same shape as PLAY.
        payload: String,
    },
    /// `(INFO)`
    Info,
    /// `(ABORT <matchid>)`
    Abort {
        /// Match identifier, validated against the active session.
        match_id: String,
    },
    /// `(PREVIEW (<gdl...>) <previewclock>)`
    Preview {
        /// Raw GDL rules text, outer parentheses stripped.
        gdl: String,
        /// Seconds allowed for the preview callback.
        preview_clock: u64,
    },
}

/// Protocol-level errors surfaced to the transport.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Text did not match any message kind.
    #[error("invalid GGP message: {0:?}")]
    Unrecognized(String),

    /// A recognized kind failed its structural grammar.
    #[error("malformed {kind} message: {text:?}")]
    MalformedMessage {
        /// The recognized kind.
        kind: MessageKind,
        /// The offending raw text.
        text: String,
    },

    /// A message referenced a match other than the active one. Handled
    /// as a forced abort, not a silent rejection.
    #[error("{kind} message has wrong match id: got {got:?}, active {active:?}")]
    MatchIdMismatch {
        /// The offending kind.
        kind: MessageKind,
        /// The identifier the message carried.
        got: String,
        /// The identifier that was active, if any.
        active: Option<String>,
    },

    /// A GDL-II PLAY/STOP carried the wrong turn number.
    #[error("{kind} message has wrong turn number: got {got}, expected {expected}")]
    TurnMismatch {
        /// The offending kind.
        kind: MessageKind,
        /// The turn number the message carried.
        got: u32,
        /// The session's current turn counter.
        expected: u32,
    },

    /// The connection was filtered out by the admission sequencer.
    #[error("connection rejected by admission ordering")]
    Rejected,

    /// The configured info callback returned an empty value.
    #[error("on_info callback returned an empty value")]
    EmptyInfoResponse,

    /// Unexpected internal fault; logged and surfaced as a server error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProtocolError {
    /// The HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::EmptyInfoResponse | ProtocolError::Internal(_) => 500,
            _ => 400,
        }
    }
}

fn recognizer(keyword: &str) -> Regex {
    RegexBuilder::new(&format!(r"^\s*\(\s*{keyword}"))
        .case_insensitive(true)
        .build()
        .expect("static recognizer pattern")
}

fn extractor(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("static extractor pattern")
}

// Indexed by MessageKind discriminant.
static RECOGNIZERS: Lazy<[Regex; 6]> = Lazy::new(|| {
    [
        recognizer("START"),
        recognizer("PLAY"),
        recognizer("STOP"),
        recognizer("INFO"),
        recognizer("ABORT"),
        recognizer("PREVIEW"),
    ]
});

static EXTRACT_START: Lazy<Regex> = Lazy::new(|| {
    extractor(r"^\s*\(\s*START\s+(\S+)\s+(\S+)\s+\((.*)\)\s+(\d+)\s+(\d+)\s*\)\s*$")
});
static EXTRACT_PLAY: Lazy<Regex> =
    Lazy::new(|| extractor(r"^\s*\(\s*PLAY\s+(\S+)\s+(.*)\s*\)\s*$"));
static EXTRACT_STOP: Lazy<Regex> =
    Lazy::new(|| extractor(r"^\s*\(\s*STOP\s+(\S+)\s+(.*)\s*\)\s*$"));
static EXTRACT_INFO: Lazy<Regex> = Lazy::new(|| extractor(r"^\s*\(\s*INFO\s*\)\s*$"));
static EXTRACT_ABORT: Lazy<Regex> =
    Lazy::new(|| extractor(r"^\s*\(\s*ABORT\s+(\S+)\s*\)\s*$"));
static EXTRACT_PREVIEW: Lazy<Regex> =
    Lazy::new(|| extractor(r"^\s*\(\s*PREVIEW\s+\((.*)\)\s+(\d+)\s*\)\s*$"));
static EXTRACT_SPS_MATCH_ID: Lazy<Regex> =
    Lazy::new(|| extractor(r"^\s*\(\s*(START|PLAY|STOP)\s+(\S+)\s+.*\)\s*$"));
static EXTRACT_SEES_TURN: Lazy<Regex> = Lazy::new(|| extractor(r"^\s*(\d+)\s+(.*)$"));

impl Message {
    /// Classify and extract in one step.
    pub fn parse(text: &str) -> Result<Message, ProtocolError> {
        let kind = MessageKind::recognize(text)
            .ok_or_else(|| ProtocolError::Unrecognized(text.to_string()))?;
        Message::extract(kind, text)
    }

    /// Run the full structural grammar for an already-recognized kind.
    pub fn extract(kind: MessageKind, text: &str) -> Result<Message, ProtocolError> {
        let malformed = || ProtocolError::MalformedMessage {
            kind,
            text: text.to_string(),
        };
        match kind {
            MessageKind::Start => {
                let caps = EXTRACT_START.captures(text).ok_or_else(malformed)?;
                Ok(Message::Start {
                    match_id: caps[1].to_string(),
                    role: caps[2].to_string(),
                    gdl: caps[3].to_string(),
                    start_clock: caps[4].parse().map_err(|_| malformed())?,
                    play_clock: caps[5].parse().map_err(|_| malformed())?,
                })
            }
            MessageKind::Play => {
                let caps = EXTRACT_PLAY.captures(text).ok_or_else(malformed)?;
                Ok(Message::Play {
                    match_id: caps[1].to_string(),
                    payload: caps[2].to_string(),
                })
            }
            MessageKind::Stop => {
                let caps = EXTRACT_STOP.captures(text).ok_or_else(malformed)?;
                Ok(Message::Stop {
                    match_id: caps[1].to_string(),
                    payload: caps[2].to_string(),
                })
            }
            MessageKind::Info => {
                EXTRACT_INFO.captures(text).ok_or_else(malformed)?;
                Ok(Message::Info)
            }
            MessageKind::Abort => {
                let caps = EXTRACT_ABORT.captures(text).ok_or_else(malformed)?;
                Ok(Message::Abort {
                    match_id: caps[1].to_string(),
                })
            }
            MessageKind::Preview => {
                let caps = EXTRACT_PREVIEW.captures(text).ok_or_else(malformed)?;
                Ok(Message::Preview {
                    gdl: caps[1].to_string(),
                    preview_clock: caps[2].parse().map_err(|_| malformed())?,
                })
            }
        }
    }
}

/// Pull the match identifier out of a START/PLAY/STOP/ABORT message
/// without running the full structural grammar. Used by the admission
/// goodness test; an unparseable identifier yields `None`, which the
/// sequencer treats as non-blocking.
pub fn peek_match_id(text: &str) -> Option<&str> {
    if let Some(caps) = EXTRACT_SPS_MATCH_ID.captures(text) {
        return caps.get(2).map(|m| m.as_str());
    }
    EXTRACT_ABORT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Determine the case style of the command keyword in an inbound
/// message. If the keyword matches neither case exactly, defaults to
/// upper and logs a warning.
pub fn keyword_case(text: &str, kind: MessageKind) -> ResponseCase {
    let upper = kind.keyword();
    let observed = text
        .trim_start()
        .strip_prefix('(')
        .map(str::trim_start)
        .and_then(|rest| rest.get(..upper.len()));
    match observed {
        Some(word) if word == upper => ResponseCase::Upper,
        Some(word) if word == upper.to_lowercase() => ResponseCase::Lower,
        _ => {
            warn!("cannot determine case used by the game master, defaulting to uppercase");
            ResponseCase::Upper
        }
    }
}

/// GDL role-extraction failures. These make the match unstartable but
/// are never surfaced to the transport.
#[derive(Debug, thiserror::Error)]
pub enum GdlError {
    /// The rules text is not a well-formed s-expression.
    #[error("invalid GDL: {0}")]
    Unparseable(#[from] SexprError),

    /// The rules declare no roles at all.
    #[error("GDL declares no roles")]
    NoRolesDeclared,
}

/// Extract role names from raw GDL text, in declaration order.
///
/// PLAY/STOP messages list joint actions positionally, so the player
/// needs the order in which roles appear in the rules to find its own
/// action. Collects the second element of every two-element top-level
/// clause whose head starts with `role` (case-insensitive).
pub fn roles_in_declaration_order(gdl: &str) -> Result<Vec<String>, GdlError> {
    let parsed = sexpr::parse(&format!("({gdl})"))?;
    let mut roles = Vec::new();
    if let SExpr::List(clauses) = parsed {
        for clause in &clauses {
            let Some(parts) = clause.as_list() else { continue };
            if parts.len() != 2 {
                continue;
            }
            let Some(head) = parts[0].as_atom() else { continue };
            if head.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("role")) {
                roles.push(parts[1].serialize()?);
            }
        }
    }
    if roles.is_empty() {
        return Err(GdlError::NoRolesDeclared);
    }
    Ok(roles)
}

/// The decoded payload of a GDL-II PLAY/STOP message:
/// `<turn> <lastmove-or-NIL> (<observation> ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeesPayload {
    /// Turn number asserted by the master.
    pub turn: u32,
    /// The move this player made last turn; `None` on the first turn.
    pub last_move: Option<String>,
    /// Observations for this player, in message order.
    pub sees: Vec<String>,
}

/// Parse the GDL-II payload of a PLAY or STOP message.
pub fn parse_sees_payload(kind: MessageKind, payload: &str) -> Result<SeesPayload, ProtocolError> {
    let malformed = || ProtocolError::MalformedMessage {
        kind,
        text: payload.to_string(),
    };

    let caps = EXTRACT_SEES_TURN.captures(payload).ok_or_else(malformed)?;
    let turn: u32 = caps[1].parse().map_err(|_| malformed())?;
    let rest = &caps[2];

    let parsed = sexpr::parse(&format!("({rest})")).map_err(|_| malformed())?;
    let parts = parsed
        .as_list()
        .filter(|parts| parts.len() == 2)
        .ok_or_else(malformed)?;

    let last = parts[0].serialize().map_err(|_| malformed())?;
    let last_move = if last.eq_ignore_ascii_case("NIL") {
        None
    } else {
        Some(last)
    };
    // The first turn cannot carry a previous move.
    if turn == 0 && last_move.is_some() {
        return Err(malformed());
    }

    let sees = match &parts[1] {
        SExpr::Atom(token) if token.eq_ignore_ascii_case("NIL") => Vec::new(),
        SExpr::Atom(_) => return Err(malformed()),
        SExpr::List(items) => items
            .iter()
            .map(SExpr::serialize)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed())?,
    };

    Ok(SeesPayload {
        turn,
        last_move,
        sees,
    })
}
