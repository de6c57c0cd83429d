//! Relay command decoding.
//!
//! An inbound text frame is `<verb> <rest>`, split at the first space. The
//! verb selects one [`Command`] variant; `rest` is verb-specific and may
//! itself contain spaces. Unknown verbs decode to [`Command::Unknown`] so
//! every frame has exactly one meaning.

/// One decoded relay command, borrowing from the frame text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `exit` - end this connection.
    Exit,
    /// `join <id>` - become a peer of the target session.
    Join(&'a str),
    /// `publish <msg>` - relay to every peer of this session.
    Publish(&'a str),
    /// `add <id>` - make the target session a peer of this one.
    Add(&'a str),
    /// `write <id> <msg>` - relay to a single peer.
    Write { target: &'a str, text: &'a str },
    /// `banner <text>` - set what the next joiner receives.
    Banner(&'a str),
    /// Anything else. Carries the verb for logging.
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Decode one frame. Never fails.
    pub fn parse(frame: &'a str) -> Self {
        let (verb, rest) = split_first(frame);
        match verb {
            "exit" => Self::Exit,
            "join" => Self::Join(rest),
            "publish" => Self::Publish(rest),
            "add" => Self::Add(rest),
            "write" => {
                let (target, text) = split_first(rest);
                Self::Write { target, text }
            }
            "banner" => Self::Banner(rest),
            _ => Self::Unknown(verb),
        }
    }

    /// Static verb name for metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Join(_) => "join",
            Self::Publish(_) => "publish",
            Self::Add(_) => "add",
            Self::Write { .. } => "write",
            Self::Banner(_) => "banner",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Split at the first space; a frame without one is all head.
fn split_first(s: &str) -> (&str, &str) {
    s.split_once(' ').unwrap_or((s, ""))
}
