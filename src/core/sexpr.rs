//! S-Expression Codec
//!
//! Parses and serializes the parenthesized token trees that every GGP
//! message is built from. This is deliberately not a full s-expression
//! dialect: there is no quoting or escaping, and no distinction between
//! numbers and text. `("quoted string")` parses as the two atoms
//! `"quoted` and `string"`.
//!
//! The codec also carries the action-list helpers the match state machine
//! uses to translate between wire text and per-role action sequences.

use std::fmt;

/// A parsed s-expression: an atomic token or an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    /// A single token, free of whitespace and parentheses.
    Atom(String),
    /// A parenthesized sequence of values.
    List(Vec<SExpr>),
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SexprError {
    /// Input was empty, had unbalanced brackets, or was otherwise
    /// unrecognizable.
    #[error("not a valid s-expression: {0:?}")]
    Malformed(String),

    /// An atom cannot be rendered because it contains whitespace or
    /// parentheses. This is a grammar violation, not a recoverable
    /// condition.
    #[error("atom contains whitespace or parentheses: {0:?}")]
    InvalidAtom(String),
}

impl SExpr {
    /// Render this value back to wire text. Lists become space-joined
    /// children inside parentheses, atoms render verbatim.
    pub fn serialize(&self) -> Result<String, SexprError> {
        match self {
            SExpr::Atom(token) => {
                if token.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
                    Err(SexprError::InvalidAtom(token.clone()))
                } else {
                    Ok(token.clone())
                }
            }
            SExpr::List(items) => {
                let rendered: Result<Vec<String>, SexprError> =
                    items.iter().map(SExpr::serialize).collect();
                Ok(format!("({})", rendered?.join(" ")))
            }
        }
    }

    /// The token if this is an atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(token) => Some(token),
            SExpr::List(_) => None,
        }
    }

    /// The children if this is a list.
    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::Atom(_) => None,
            SExpr::List(items) => Some(items),
        }
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExpr::Atom(token) => write!(f, "{token}"),
            SExpr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse wire text into a single s-expression value.
///
/// A run of characters containing none of `(`, `)`, or whitespace is one
/// atom; parentheses delimit nested lists; whitespace only separates
/// tokens. If the input holds several top-level values the first one is
/// returned, so callers wrap the input in an outer pair of parentheses
/// when they need the whole sequence.
pub fn parse(text: &str) -> Result<SExpr, SexprError> {
    let mut stack: Vec<Vec<SExpr>> = Vec::new();
    let mut current: Vec<SExpr> = Vec::new();
    let mut atom = String::new();

    for ch in text.chars() {
        match ch {
            '(' => {
                flush_atom(&mut atom, &mut current);
                stack.push(std::mem::take(&mut current));
            }
            ')' => {
                flush_atom(&mut atom, &mut current);
                let finished = std::mem::take(&mut current);
                current = stack
                    .pop()
                    .ok_or_else(|| SexprError::Malformed(text.to_string()))?;
                current.push(SExpr::List(finished));
            }
            c if c.is_whitespace() => flush_atom(&mut atom, &mut current),
            c => atom.push(c),
        }
    }
    flush_atom(&mut atom, &mut current);

    if !stack.is_empty() {
        return Err(SexprError::Malformed(text.to_string()));
    }
    current
        .into_iter()
        .next()
        .ok_or_else(|| SexprError::Malformed(text.to_string()))
}

fn flush_atom(atom: &mut String, out: &mut Vec<SExpr>) {
    if !atom.is_empty() {
        out.push(SExpr::Atom(std::mem::take(atom)));
    }
}

/// Split an action payload into its component action strings.
///
/// The literal token `NIL` (any case) yields an empty sequence, a bare
/// atom yields a one-element sequence, and a list yields each child
/// rendered back to text.
pub fn parse_action_list(text: &str) -> Result<Vec<String>, SexprError> {
    match parse(text)? {
        SExpr::Atom(token) if token.eq_ignore_ascii_case("NIL") => Ok(Vec::new()),
        atom @ SExpr::Atom(_) => Ok(vec![atom.serialize()?]),
        SExpr::List(items) => items.iter().map(SExpr::serialize).collect(),
    }
}

/// Render a sequence of actions back to an action payload.
///
/// Empty renders as `NIL`, a single action renders bare, anything longer
/// renders as a parenthesized space-joined list.
pub fn render_action_list(actions: &[String]) -> String {
    match actions {
        [] => "NIL".to_string(),
        [only] => only.clone(),
        _ => format!("({})", actions.join(" ")),
    }
}

/// Split an action-value payload into `(action, value)` pairs.
///
/// For example `((NOOP 50) ((MARK 3 4) 60))` yields
/// `[("NOOP", 50), ("(MARK 3 4)", 60)]`. The empty list `()` is legal and
/// yields no pairs.
pub fn parse_action_value_pairs(text: &str) -> Result<Vec<(String, i64)>, SexprError> {
    let items = match parse(text)? {
        SExpr::List(items) => items,
        SExpr::Atom(_) => return Err(SexprError::Malformed(text.to_string())),
    };
    items
        .iter()
        .map(|pair| {
            let parts = pair
                .as_list()
                .filter(|parts| parts.len() == 2)
                .ok_or_else(|| SexprError::Malformed(text.to_string()))?;
            let action = parts[0].serialize()?;
            let value = parts[1]
                .as_atom()
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| SexprError::Malformed(text.to_string()))?;
            Ok((action, value))
        })
        .collect()
}

/// Render `(action, value)` pairs back to an action-value payload.
pub fn render_action_value_pairs(pairs: &[(String, i64)]) -> String {
    let rendered: Vec<String> = pairs
        .iter()
        .map(|(action, value)| format!("({action} {value})"))
        .collect();
    format!("({})", rendered.join(" "))
}
