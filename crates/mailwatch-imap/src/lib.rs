//! # mailwatch-imap
//!
//! An async IMAP4 client protocol engine for programs that poll or watch a
//! mailbox without being a full mail client.
//!
//! ## Features
//!
//! - **Single stateful connection**: greeting, CAPABILITY, STARTTLS upgrade,
//!   LOGIN, SELECT/EXAMINE, UID SEARCH, UID FETCH, IDLE
//! - **Sans-I/O core**: the wire parser and connection state machine are
//!   pure, deterministic, and tested without a network
//! - **Single command in flight**: strict tag correlation with FIFO queueing
//!   of concurrent operations
//! - **Server push**: EXISTS/EXPUNGE/RECENT/BYE surface as notifications to
//!   any number of registered handlers
//! - **TLS via rustls**: secure connections without an OpenSSL dependency
//! - **SOCKS4/SOCKS5**: optional proxy hop, wrapped in TLS immediately
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwatch_imap::{Dispatcher, ImapConfig, ImapConnection, LoggingHandler};
//!
//! #[tokio::main]
//! async fn main() -> mailwatch_imap::Result<()> {
//!     let config = ImapConfig::builder("imap.example.com")
//!         .credentials("user@example.com", "password")
//!         .build();
//!
//!     let dispatcher = Dispatcher::new().with(Box::new(LoggingHandler));
//!     let conn = ImapConnection::connect_with(
//!         config,
//!         dispatcher,
//!         Box::new(mailwatch_imap::BasicDecoder),
//!     )
//!     .await?;
//!
//!     // Auto-login ran during connect; open the mailbox and look around.
//!     let inbox = conn.open_box("INBOX", false).await?;
//!     println!("{} messages", inbox.messages.total);
//!
//!     let uids = conn.search_uid("1:*").await?;
//!     if !uids.is_empty() {
//!         conn.fetch_uid(&uids).await?; // bodies arrive as mail events
//!     }
//!
//!     // Wait for the server to push a change.
//!     if conn.supports_idle().await? {
//!         conn.idle().await?;
//!     }
//!
//!     conn.logout().await?;
//!     conn.destroy().await
//! }
//! ```
//!
//! ## Connection lifecycle
//!
//! ```text
//! disconnected → connecting → connected(plain) ─ [proxy hop] ─┐
//!        ▲                        │                           │
//!        │                  [tls upgrade]                     │
//!        │                        ▼                           ▼
//!        │                 connected(secure) ─────────────→ ready
//!        │                                                    │
//!        │                                              authenticating
//!        │                                                    ▼
//!        └──── error/close/end/timeout/destroy ──── authenticated → selected → idling
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: incremental wire parser (lines + literal payloads)
//! - [`pipeline`]: tag correlation and single-flight command queueing
//! - [`protocol`]: sans-I/O connection state machine
//! - [`connection`]: tokio transports and the async operation surface
//! - [`search`]: structured search expression compiler
//! - [`utf7`]: modified UTF-7 mailbox-name codec
//! - [`events`]: application notification fan-out
//! - [`mime`]: mail decoder collaborator seam

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
mod error;
pub mod events;
pub mod mime;
pub mod parser;
pub mod pipeline;
pub mod protocol;
pub mod search;
pub mod types;
pub mod utf7;

pub use config::{ImapConfig, ImapConfigBuilder, ProxyConfig, ProxyVersion};
pub use connection::{ImapConnection, ImapStream, SessionSnapshot};
pub use error::{Error, Result};
pub use events::{
    ChannelHandler, CollectingHandler, Dispatcher, EventHandler, LoggingHandler, MailResult,
    Notification,
};
pub use mime::{BasicDecoder, DecodedMail, MailDecoder};
pub use parser::{
    BodyEvent, Continuation, SearchResult, TaggedResponse, UntaggedResponse, WireEvent, WireParser,
};
pub use pipeline::{Pipeline, Transmit};
pub use protocol::{ConnectionState, Protocol, ProtocolEvent};
pub use search::{SearchQuery, SearchTerm, SeqSet, SeqToken};
pub use types::{Capability, CapabilitySet, MailboxState, MessageCounts, SeqNum, Status, Uid};

/// IMAP protocol version this engine targets.
pub const IMAP_VERSION: &str = "IMAP4rev1";
