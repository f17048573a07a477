//! Application-facing notifications.
//!
//! The engine reports asynchronous happenings — server-pushed mailbox
//! changes, lifecycle transitions, faults — through the [`EventHandler`]
//! trait. Register any number of independent handlers on a [`Dispatcher`];
//! each notification fans out to all of them in registration order.

use tokio::sync::mpsc::UnboundedSender;

use crate::mime::DecodedMail;
use crate::types::{MessageCounts, SeqNum, Uid};

/// A decoded (or failed) mail delivery for one fetched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailResult {
    /// UID the body was keyed by, when the server included one.
    pub uid: Option<Uid>,
    /// The decoder's verdict for this body.
    pub mail: Result<DecodedMail, String>,
}

/// A notification emitted by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Transport established (TCP, proxy, or TLS as configured).
    Connected,
    /// Greeting and capability exchange finished; login may proceed.
    Ready,
    /// LOGIN settled; on failure the server's text is included.
    Login {
        /// True when the server accepted the credentials.
        ok: bool,
        /// Server text on failure.
        text: Option<String>,
    },
    /// Mailbox message count changed.
    Exists(MessageCounts),
    /// A message was expunged.
    Expunge(SeqNum),
    /// Recent-count report.
    Recent(u32),
    /// Mailbox flag list.
    Flags(Vec<String>),
    /// Server announced imminent disconnect.
    Bye(String),
    /// Server complained outside any command context.
    CommandError(String),
    /// Transport fault.
    SocketError(String),
    /// SOCKS dial failed.
    ProxyError(String),
    /// Connection fully closed.
    Closed {
        /// True when an error caused the close.
        had_error: bool,
    },
    /// Peer ended the stream.
    Ended,
    /// Socket idle timeout fired.
    Timeout,
    /// Raw bytes arrived from the server.
    Raw(Vec<u8>),
    /// A fetched body finished decoding.
    Mail(MailResult),
    /// The connection was torn down.
    Destroyed,
}

/// Receives connection notifications.
///
/// All methods default to no-ops; implement only the events you care about.
#[allow(unused_variables)]
pub trait EventHandler: Send {
    /// Transport established.
    fn on_connected(&mut self) {}

    /// Ready for login.
    fn on_ready(&mut self) {}

    /// LOGIN settled.
    fn on_login(&mut self, ok: bool, text: Option<&str>) {}

    /// Message count changed.
    fn on_exists(&mut self, counts: MessageCounts) {}

    /// Message expunged.
    fn on_expunge(&mut self, seq: SeqNum) {}

    /// Recent-count report.
    fn on_recent(&mut self, count: u32) {}

    /// Mailbox flag list.
    fn on_flags(&mut self, flags: &[String]) {}

    /// Server announced imminent disconnect.
    fn on_bye(&mut self, text: &str) {}

    /// Server complained outside any command context.
    fn on_command_error(&mut self, text: &str) {}

    /// Transport fault.
    fn on_socket_error(&mut self, text: &str) {}

    /// SOCKS dial failed.
    fn on_proxy_error(&mut self, text: &str) {}

    /// Connection fully closed.
    fn on_closed(&mut self, had_error: bool) {}

    /// Peer ended the stream.
    fn on_ended(&mut self) {}

    /// Socket idle timeout fired.
    fn on_timeout(&mut self) {}

    /// Raw bytes arrived from the server.
    fn on_raw(&mut self, data: &[u8]) {}

    /// A fetched body finished decoding.
    fn on_mail(&mut self, result: &MailResult) {}

    /// The connection was torn down.
    fn on_destroyed(&mut self) {}
}

/// Fans notifications out to any number of registered handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; notifications reach handlers in this order.
    pub fn register(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, handler: Box<dyn EventHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers one notification to every handler.
    pub fn dispatch(&mut self, notification: &Notification) {
        for handler in &mut self.handlers {
            match notification {
                Notification::Connected => handler.on_connected(),
                Notification::Ready => handler.on_ready(),
                Notification::Login { ok, text } => handler.on_login(*ok, text.as_deref()),
                Notification::Exists(counts) => handler.on_exists(*counts),
                Notification::Expunge(seq) => handler.on_expunge(*seq),
                Notification::Recent(count) => handler.on_recent(*count),
                Notification::Flags(flags) => handler.on_flags(flags),
                Notification::Bye(text) => handler.on_bye(text),
                Notification::CommandError(text) => handler.on_command_error(text),
                Notification::SocketError(text) => handler.on_socket_error(text),
                Notification::ProxyError(text) => handler.on_proxy_error(text),
                Notification::Closed { had_error } => handler.on_closed(*had_error),
                Notification::Ended => handler.on_ended(),
                Notification::Timeout => handler.on_timeout(),
                Notification::Raw(data) => handler.on_raw(data),
                Notification::Mail(result) => handler.on_mail(result),
                Notification::Destroyed => handler.on_destroyed(),
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A handler that logs notifications via tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_connected(&mut self) {
        tracing::info!("connected");
    }

    fn on_ready(&mut self) {
        tracing::info!("ready");
    }

    fn on_login(&mut self, ok: bool, text: Option<&str>) {
        tracing::info!(ok, text, "login");
    }

    fn on_exists(&mut self, counts: MessageCounts) {
        tracing::debug!(total = counts.total, new = counts.new, "EXISTS");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "EXPUNGE");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_flags(&mut self, flags: &[String]) {
        tracing::debug!(?flags, "FLAGS");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }

    fn on_command_error(&mut self, text: &str) {
        tracing::warn!(text, "command error");
    }

    fn on_socket_error(&mut self, text: &str) {
        tracing::error!(text, "socket error");
    }

    fn on_proxy_error(&mut self, text: &str) {
        tracing::error!(text, "proxy error");
    }

    fn on_closed(&mut self, had_error: bool) {
        tracing::info!(had_error, "closed");
    }

    fn on_ended(&mut self) {
        tracing::info!("ended");
    }

    fn on_timeout(&mut self) {
        tracing::warn!("socket timeout");
    }

    fn on_mail(&mut self, result: &MailResult) {
        tracing::debug!(uid = result.uid.map(Uid::get), ok = result.mail.is_ok(), "mail");
    }

    fn on_destroyed(&mut self) {
        tracing::info!("destroyed");
    }
}

/// A handler that collects notifications for later inspection.
///
/// Mainly useful in tests. Raw byte notifications are not collected.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    sink: std::sync::Arc<std::sync::Mutex<Vec<Notification>>>,
}

impl CollectingHandler {
    /// Creates a collector and a shared view of its sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared view onto the collected notifications.
    #[must_use]
    pub fn sink(&self) -> std::sync::Arc<std::sync::Mutex<Vec<Notification>>> {
        std::sync::Arc::clone(&self.sink)
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut sink) = self.sink.lock() {
            sink.push(notification);
        }
    }
}

impl EventHandler for CollectingHandler {
    fn on_connected(&mut self) {
        self.push(Notification::Connected);
    }

    fn on_ready(&mut self) {
        self.push(Notification::Ready);
    }

    fn on_login(&mut self, ok: bool, text: Option<&str>) {
        self.push(Notification::Login {
            ok,
            text: text.map(str::to_string),
        });
    }

    fn on_exists(&mut self, counts: MessageCounts) {
        self.push(Notification::Exists(counts));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.push(Notification::Expunge(seq));
    }

    fn on_recent(&mut self, count: u32) {
        self.push(Notification::Recent(count));
    }

    fn on_flags(&mut self, flags: &[String]) {
        self.push(Notification::Flags(flags.to_vec()));
    }

    fn on_bye(&mut self, text: &str) {
        self.push(Notification::Bye(text.to_string()));
    }

    fn on_command_error(&mut self, text: &str) {
        self.push(Notification::CommandError(text.to_string()));
    }

    fn on_socket_error(&mut self, text: &str) {
        self.push(Notification::SocketError(text.to_string()));
    }

    fn on_proxy_error(&mut self, text: &str) {
        self.push(Notification::ProxyError(text.to_string()));
    }

    fn on_closed(&mut self, had_error: bool) {
        self.push(Notification::Closed { had_error });
    }

    fn on_ended(&mut self) {
        self.push(Notification::Ended);
    }

    fn on_timeout(&mut self) {
        self.push(Notification::Timeout);
    }

    fn on_mail(&mut self, result: &MailResult) {
        self.push(Notification::Mail(result.clone()));
    }

    fn on_destroyed(&mut self) {
        self.push(Notification::Destroyed);
    }
}

/// A handler that forwards notifications into an async channel.
///
/// Lets async consumers `recv()` notifications instead of registering
/// callbacks. Raw byte notifications are not forwarded.
#[derive(Debug)]
pub struct ChannelHandler {
    sender: UnboundedSender<Notification>,
}

impl ChannelHandler {
    /// Wraps an unbounded sender.
    #[must_use]
    pub const fn new(sender: UnboundedSender<Notification>) -> Self {
        Self { sender }
    }

    fn send(&self, notification: Notification) {
        // The receiver may be gone; dropping the notification is fine then.
        let _ = self.sender.send(notification);
    }
}

impl EventHandler for ChannelHandler {
    fn on_connected(&mut self) {
        self.send(Notification::Connected);
    }

    fn on_ready(&mut self) {
        self.send(Notification::Ready);
    }

    fn on_login(&mut self, ok: bool, text: Option<&str>) {
        self.send(Notification::Login {
            ok,
            text: text.map(str::to_string),
        });
    }

    fn on_exists(&mut self, counts: MessageCounts) {
        self.send(Notification::Exists(counts));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.send(Notification::Expunge(seq));
    }

    fn on_recent(&mut self, count: u32) {
        self.send(Notification::Recent(count));
    }

    fn on_flags(&mut self, flags: &[String]) {
        self.send(Notification::Flags(flags.to_vec()));
    }

    fn on_bye(&mut self, text: &str) {
        self.send(Notification::Bye(text.to_string()));
    }

    fn on_command_error(&mut self, text: &str) {
        self.send(Notification::CommandError(text.to_string()));
    }

    fn on_socket_error(&mut self, text: &str) {
        self.send(Notification::SocketError(text.to_string()));
    }

    fn on_proxy_error(&mut self, text: &str) {
        self.send(Notification::ProxyError(text.to_string()));
    }

    fn on_closed(&mut self, had_error: bool) {
        self.send(Notification::Closed { had_error });
    }

    fn on_ended(&mut self) {
        self.send(Notification::Ended);
    }

    fn on_timeout(&mut self) {
        self.send(Notification::Timeout);
    }

    fn on_mail(&mut self, result: &MailResult) {
        self.send(Notification::Mail(result.clone()));
    }

    fn on_destroyed(&mut self) {
        self.send(Notification::Destroyed);
    }
}
