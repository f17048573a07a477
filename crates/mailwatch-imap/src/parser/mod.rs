//! Incremental IMAP wire parser.
//!
//! The parser consumes an append-only byte stream: each call's unconsumed
//! bytes persist for the next call, and every completed protocol unit is
//! emitted, synchronously and in order, as a [`WireEvent`]. Nothing is
//! emitted for a partial line — that is the backpressure point.
//!
//! Malformed lines never fail the parser: anything that matches none of the
//! three response shapes comes out as [`WireEvent::Other`].

mod line;

use bytes::BytesMut;

use crate::types::{SeqNum, Status, Uid};

use line::ParsedLine;

/// A tagged response line: `A<tag> (OK|NO|BAD) [<code>] <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResponse {
    /// The integer tag correlating this response to a command.
    pub tag: u32,
    /// Result status.
    pub status: Status,
    /// Optional bracketed response code, kept verbatim.
    pub code: Option<String>,
    /// Human-readable text.
    pub text: String,
}

/// A continuation request: `+[ [<code>]] <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// Optional bracketed response code.
    pub code: Option<String>,
    /// Free text; `"idling"` signals IDLE-streaming mode.
    pub text: String,
}

/// A completed body literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyEvent {
    /// UID carried from the FETCH argument fragment, if present.
    pub uid: Option<Uid>,
    /// The full literal payload, exactly as many bytes as declared.
    pub data: Vec<u8>,
}

/// Decoded SEARCH payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Matching message ids.
    pub ids: Vec<u32>,
    /// Highest mod-sequence, when the server appends `(MODSEQ <n>)`.
    pub modseq: Option<u64>,
}

/// An untagged response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK ...` — greeting or informational.
    Ok {
        /// Optional bracketed response code.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO ...`
    No {
        /// Optional bracketed response code.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD ...`
    Bad {
        /// Optional bracketed response code.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE ...` — server is about to close the connection.
    Bye {
        /// Optional bracketed response code.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...` — capability tokens as sent.
    Capability(Vec<String>),
    /// `* FLAGS (...)` — flag tokens.
    Flags(Vec<String>),
    /// `* SEARCH ...` — matching ids, with optional CONDSTORE modseq.
    Search(SearchResult),
    /// `* SORT ...` — ordered ids.
    Sort(Vec<u32>),
    /// `* <n> EXISTS` — total message count.
    Exists(u32),
    /// `* <n> RECENT` — recent message count.
    Recent(u32),
    /// `* <n> EXPUNGE` — message removed.
    Expunge(SeqNum),
    /// `* <n> FETCH ...` without a body literal; arguments kept raw.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Unparsed argument text.
        raw: String,
    },
    /// Any other keyword; the payload passes through unparsed.
    Unknown {
        /// Uppercased keyword.
        keyword: String,
        /// Unparsed trailing text.
        raw: String,
    },
}

/// An event produced by the parser, one per completed protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Terminal result line for a command.
    Tagged(TaggedResponse),
    /// Asynchronous/informational server line.
    Untagged(UntaggedResponse),
    /// Server prompt requesting further client input.
    Continuation(Continuation),
    /// Completed length-prefixed literal payload.
    Body(BodyEvent),
    /// Line matching none of the three shapes; never fatal.
    Other(String),
}

/// Literal accumulation in progress.
#[derive(Debug)]
struct LiteralProgress {
    uid: Option<Uid>,
    remaining: usize,
    data: Vec<u8>,
}

/// Incremental wire parser.
///
/// Feed it raw bytes as they arrive; it buffers partial lines and literal
/// payloads across calls and emits completed units in order.
#[derive(Debug, Default)]
pub struct WireParser {
    buf: BytesMut,
    literal: Option<LiteralProgress>,
}

impl WireParser {
    /// Creates a new parser with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a body literal is currently being accumulated.
    #[must_use]
    pub const fn literal_in_progress(&self) -> bool {
        self.literal.is_some()
    }

    /// Consumes a chunk of received bytes and returns all events completed
    /// by it.
    ///
    /// Multiple units arriving in one read are all emitted before control
    /// returns to the caller.
    pub fn feed(&mut self, input: &[u8]) -> Vec<WireEvent> {
        self.buf.extend_from_slice(input);

        let mut events = Vec::new();
        loop {
            if let Some(lit) = self.literal.as_mut() {
                let take = lit.remaining.min(self.buf.len());
                let chunk = self.buf.split_to(take);
                lit.data.extend_from_slice(&chunk);
                lit.remaining -= take;
                if lit.remaining > 0 {
                    break;
                }
                if let Some(done) = self.literal.take() {
                    events.push(WireEvent::Body(BodyEvent {
                        uid: done.uid,
                        data: done.data,
                    }));
                }
                continue;
            }

            let Some(pos) = find_crlf(&self.buf) else {
                break;
            };
            let raw = self.buf.split_to(pos + 2);
            let text = String::from_utf8_lossy(&raw[..raw.len() - 2]).into_owned();

            match line::parse_line(&text) {
                ParsedLine::Event(event) => events.push(event),
                ParsedLine::LiteralStart { uid, size } => {
                    if size == 0 {
                        events.push(WireEvent::Body(BodyEvent {
                            uid,
                            data: Vec::new(),
                        }));
                    } else {
                        self.literal = Some(LiteralProgress {
                            uid,
                            remaining: size,
                            data: Vec::with_capacity(size),
                        });
                    }
                }
            }
        }
        events
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
