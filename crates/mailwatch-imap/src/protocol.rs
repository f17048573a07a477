//! Sans-I/O connection state machine.
//!
//! [`Protocol`] is the pure core of the engine: feed it received bytes with
//! [`Protocol::handle_input`], drain outbound frames with
//! [`Protocol::poll_transmit`], and act on the [`ProtocolEvent`]s it emits.
//! No I/O happens here, which keeps every state transition deterministic and
//! directly testable.
//!
//! The machine owns the wire parser, the command pipeline, and the session
//! model (capabilities, login state, selected mailbox). It runs the
//! greeting → CAPABILITY → STARTTLS → ready → auto-login chain, attributes
//! EXISTS deltas, answers EXISTS with `DONE` while idling, and forwards
//! server-pushed changes as [`Notification`]s.

use crate::config::ImapConfig;
use crate::error::{Error, Result};
use crate::events::Notification;
use crate::parser::{TaggedResponse, UntaggedResponse, WireEvent, WireParser};
use crate::pipeline::{Callback, Pipeline, Transmit};
use crate::search::{SearchQuery, SeqSet};
use crate::types::{CapabilitySet, MailboxState, MessageCounts, Uid};
use crate::utf7;

/// Completion channel for a public operation.
pub type Reply<T> = tokio::sync::oneshot::Sender<T>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; the machine ignores everything but reconnection.
    #[default]
    Disconnected,
    /// Transport open, normal command traffic.
    Connected,
    /// IDLE acknowledged by the server; EXISTS triggers `DONE`.
    Idling,
}

/// Directives and notifications produced by the state machine.
#[derive(Debug)]
pub enum ProtocolEvent {
    /// Deliver this notification to the application.
    Notify(Notification),
    /// STARTTLS was accepted: the driver must re-negotiate the transport as
    /// TLS now, then call [`Protocol::tls_established`].
    UpgradeTls,
    /// A body literal completed; hand it to the mail decoder.
    MailBody {
        /// UID carried from the FETCH fragment, if present.
        uid: Option<Uid>,
        /// The literal payload.
        data: Vec<u8>,
    },
}

/// Sans-I/O IMAP connection state machine.
pub struct Protocol {
    user: String,
    password: String,
    auto_login: bool,
    proxied: bool,

    state: ConnectionState,
    authenticated: bool,
    secure: bool,
    greeting_seen: bool,
    ready_emitted: bool,

    parser: WireParser,
    pipeline: Pipeline<Self>,
    caps: CapabilitySet,
    mailbox: Option<MailboxState>,
    /// Mailbox staged by an in-flight SELECT/EXAMINE; promoted on its OK.
    selecting: Option<MailboxState>,
    last_search: Vec<u32>,
    last_search_modseq: Option<u64>,

    events: Vec<ProtocolEvent>,
}

impl Protocol {
    /// Creates a state machine for the given configuration.
    #[must_use]
    pub fn new(config: &ImapConfig) -> Self {
        let proxied = config.proxy.is_some();
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            auto_login: config.auto_login,
            proxied,
            state: ConnectionState::Disconnected,
            authenticated: false,
            // Both the proxy path and the implicit-TLS path start encrypted.
            secure: proxied || config.tls,
            greeting_seen: false,
            ready_emitted: false,
            parser: WireParser::new(),
            pipeline: Pipeline::new(),
            caps: CapabilitySet::new(),
            mailbox: None,
            selecting: None,
            last_search: Vec::new(),
            last_search_modseq: None,
            events: Vec::new(),
        }
    }

    // === Driver interface ===

    /// Marks the transport as open.
    pub fn transport_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.notify(Notification::Connected);
    }

    /// Marks the STARTTLS upgrade as complete.
    pub fn tls_established(&mut self) {
        self.secure = true;
        self.become_ready();
    }

    /// Feeds received bytes and returns the events they produced.
    pub fn handle_input(&mut self, data: &[u8]) -> Vec<ProtocolEvent> {
        for event in self.parser.feed(data) {
            self.handle_wire_event(event);
        }
        self.take_events()
    }

    /// Drains events produced by operations invoked outside `handle_input`.
    pub fn take_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns the next outbound frame, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.pipeline.poll_transmit()
    }

    /// Tears the machine down.
    ///
    /// Idempotent. Pending command callbacks are discarded, never invoked;
    /// their reply channels close, which awaiting callers observe as
    /// [`Error::Destroyed`].
    pub fn destroy(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.authenticated = false;
        self.pipeline.drain();
        self.parser = WireParser::new();
        self.notify(Notification::Destroyed);
    }

    // === Session model accessors ===

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once LOGIN succeeded and until logout/teardown.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns true while the server is in IDLE-streaming mode.
    #[must_use]
    pub fn is_idling(&self) -> bool {
        self.state == ConnectionState::Idling
    }

    /// The server's advertised capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    /// Returns true if the server advertises IDLE.
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.caps.supports_idle()
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub const fn mailbox(&self) -> Option<&MailboxState> {
        self.mailbox.as_ref()
    }

    /// Mod-sequence from the most recent CONDSTORE search, if any.
    #[must_use]
    pub const fn last_search_modseq(&self) -> Option<u64> {
        self.last_search_modseq
    }

    // === Operations ===

    /// Submits LOGIN with the configured credentials.
    ///
    /// Already-authenticated connections resolve immediately without a round
    /// trip. A server rejection resolves `Ok(false)` — login failure is a
    /// value, not an error.
    pub fn login(&mut self, reply: Option<Reply<Result<bool>>>) {
        if self.authenticated {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(true));
            }
            return;
        }
        let command = format!("LOGIN {} {}", quote(&self.user), quote(&self.password));
        self.pipeline.submit(
            command,
            Some(Box::new(
                move |proto: &mut Self, resp: &TaggedResponse| {
                    let ok = resp.status.is_ok();
                    if ok {
                        proto.authenticated = true;
                        proto.notify(Notification::Login { ok: true, text: None });
                    } else {
                        proto.notify(Notification::Login {
                            ok: false,
                            text: Some(resp.text.clone()),
                        });
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(ok));
                    }
                },
            )),
        );
    }

    /// Submits SELECT (or EXAMINE when `read_only`) for the mailbox.
    ///
    /// The name is modified-UTF-7 encoded and percent-escaped for the wire.
    /// Resolves with a snapshot of the fresh mailbox state.
    pub fn open_box(
        &mut self,
        name: &str,
        read_only: bool,
        reply: Option<Reply<Result<MailboxState>>>,
    ) {
        let encoded = utf7::encode_mailbox_name(name);
        let verb = if read_only { "EXAMINE" } else { "SELECT" };
        self.selecting = Some(MailboxState::new(name, read_only));
        self.pipeline.submit(
            format!("{verb} \"{encoded}\""),
            Some(Box::new(
                move |proto: &mut Self, resp: &TaggedResponse| {
                    if resp.status.is_ok() {
                        if let Some(selected) = proto.selecting.take() {
                            proto.mailbox = Some(selected);
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(proto.mailbox.clone().ok_or_else(|| {
                                Error::Protocol("mailbox state missing after select".to_string())
                            }));
                        }
                    } else {
                        proto.selecting = None;
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(Error::Command(resp.text.clone())));
                        }
                    }
                },
            )),
        );
    }

    /// Submits `UID SEARCH UID <range>`.
    ///
    /// The range is validated before transmission; resolves with the most
    /// recent decoded SEARCH id list.
    pub fn search_uid(&mut self, range: &str, reply: Option<Reply<Result<Vec<u32>>>>) {
        match SeqSet::parse(range) {
            Ok(set) => self.submit_search(format!("UID SEARCH UID {set}"), reply),
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }

    /// Compiles and submits a structured search expression.
    pub fn search(&mut self, query: &SearchQuery, reply: Option<Reply<Result<Vec<u32>>>>) {
        match query.compile(&self.caps) {
            Ok(expr) => self.submit_search(format!("UID SEARCH {expr}"), reply),
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }

    fn submit_search(&mut self, command: String, reply: Option<Reply<Result<Vec<u32>>>>) {
        let text = command.clone();
        self.pipeline.submit(
            command,
            Some(Box::new(
                move |proto: &mut Self, resp: &TaggedResponse| {
                    if let Some(reply) = reply {
                        if resp.status.is_ok() {
                            let _ = reply.send(Ok(proto.last_search.clone()));
                        } else {
                            let _ = reply.send(Err(Error::Command(format!(
                                "{text}\n{}",
                                resp.text
                            ))));
                        }
                    }
                },
            )),
        );
    }

    /// Submits `UID FETCH` for full bodies of the given uids.
    ///
    /// Bodies arrive as separate mail events keyed by uid; the tagged OK
    /// this resolves on only means the server finished sending.
    pub fn fetch_uid(&mut self, uids: &[u32], reply: Option<Reply<Result<bool>>>) {
        let set = match SeqSet::from_ids(uids) {
            Ok(set) => set,
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
                return;
            }
        };
        self.pipeline.submit(
            format!("UID FETCH {set} (UID FLAGS INTERNALDATE BODYSTRUCTURE BODY[])"),
            Some(Box::new(
                move |_proto: &mut Self, resp: &TaggedResponse| {
                    if let Some(reply) = reply {
                        if resp.status.is_ok() {
                            let _ = reply.send(Ok(true));
                        } else {
                            let _ = reply.send(Err(Error::Command(resp.text.clone())));
                        }
                    }
                },
            )),
        );
    }

    /// Submits the RFC 2971 ID command.
    ///
    /// Field counts and lengths are validated before transmission.
    pub fn id(&mut self, params: &[(String, String)], reply: Option<Reply<Result<bool>>>) {
        let command = match build_id_command(params) {
            Ok(command) => command,
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
                return;
            }
        };
        self.pipeline
            .submit(command, reply.map(success_callback));
    }

    /// Submits NOOP; resolves with the success boolean.
    pub fn noop(&mut self, reply: Option<Reply<Result<bool>>>) {
        self.pipeline.submit("NOOP", reply.map(success_callback));
    }

    /// Submits LOGOUT; clears the authenticated flag on success.
    pub fn logout(&mut self, reply: Option<Reply<Result<bool>>>) {
        self.pipeline.submit(
            "LOGOUT",
            Some(Box::new(
                move |proto: &mut Self, resp: &TaggedResponse| {
                    let ok = resp.status.is_ok();
                    if ok && proto.authenticated {
                        proto.authenticated = false;
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(ok));
                    }
                },
            )),
        );
    }

    /// Submits IDLE.
    ///
    /// The reply settles only when the tagged response arrives — after DONE
    /// terminates the idle — never on the EXISTS events streamed meanwhile.
    pub fn idle(&mut self, reply: Option<Reply<Result<bool>>>) {
        self.pipeline.submit("IDLE", reply.map(success_callback));
    }

    // === Wire event handling ===

    fn handle_wire_event(&mut self, event: WireEvent) {
        match event {
            WireEvent::Tagged(resp) => {
                tracing::debug!(tag = resp.tag, status = ?resp.status, text = %resp.text, "<=");
                // Clear busy, invoke the callback, then dequeue — in that
                // order, so a callback may submit follow-ups ahead of the
                // queue without racing them.
                let callback = self.pipeline.complete(resp.tag);
                if let Some(callback) = callback {
                    callback(self, &resp);
                }
                self.pipeline.pump();
            }
            WireEvent::Untagged(response) => self.handle_untagged(response),
            WireEvent::Continuation(cont) => {
                if cont.text == "idling" {
                    self.state = ConnectionState::Idling;
                }
            }
            WireEvent::Body(body) => {
                self.events.push(ProtocolEvent::MailBody {
                    uid: body.uid,
                    data: body.data,
                });
            }
            WireEvent::Other(line) => {
                tracing::debug!(%line, "ignoring unrecognized line");
            }
        }
    }

    fn handle_untagged(&mut self, response: UntaggedResponse) {
        match response {
            UntaggedResponse::Ok { code, text } => {
                if !self.greeting_seen && !self.pipeline.is_busy() {
                    self.greeting_seen = true;
                    tracing::debug!(%text, "greeting");
                    self.request_capabilities();
                    return;
                }
                if let Some(code) = code {
                    self.apply_status_code(&code);
                }
            }
            UntaggedResponse::Bye { text, .. } => self.notify(Notification::Bye(text)),
            UntaggedResponse::No { text, .. } | UntaggedResponse::Bad { text, .. } => {
                let message = self.pipeline.in_flight().map_or_else(
                    || format!("received negative response: {text}"),
                    |cmd| format!("bad command {}", cmd.text),
                );
                self.notify(Notification::CommandError(message));
            }
            UntaggedResponse::Capability(tokens) => self.caps.replace(tokens),
            UntaggedResponse::Flags(flags) => {
                if let Some(mbx) = self.selecting.as_mut().or(self.mailbox.as_mut()) {
                    mbx.flags.clone_from(&flags);
                }
                self.notify(Notification::Flags(flags));
            }
            UntaggedResponse::Search(result) => {
                self.last_search = result.ids;
                self.last_search_modseq = result.modseq;
            }
            UntaggedResponse::Sort(ids) => {
                self.last_search = ids;
                self.last_search_modseq = None;
            }
            UntaggedResponse::Exists(total) => self.handle_exists(total),
            UntaggedResponse::Recent(count) => {
                if let Some(mbx) = self.selecting.as_mut().or(self.mailbox.as_mut()) {
                    mbx.messages.new = count;
                }
                self.notify(Notification::Recent(count));
            }
            UntaggedResponse::Expunge(seq) => self.notify(Notification::Expunge(seq)),
            UntaggedResponse::Fetch { seq, raw } => {
                tracing::trace!(seq = seq.get(), %raw, "unsolicited FETCH");
            }
            UntaggedResponse::Unknown { keyword, raw } => {
                tracing::trace!(%keyword, %raw, "unhandled untagged response");
            }
        }
    }

    fn handle_exists(&mut self, total: u32) {
        let authenticated = self.authenticated;
        let counts = match self.selecting.as_mut().or(self.mailbox.as_mut()) {
            Some(mbx) => {
                let prev = mbx.messages.total;
                mbx.messages.total = total;
                if authenticated && total > prev {
                    mbx.messages.new = total - prev;
                }
                mbx.messages
            }
            None => MessageCounts { total, new: 0 },
        };
        self.notify(Notification::Exists(counts));

        // IDLE termination is untagged, so DONE bypasses the tag path.
        if self.state == ConnectionState::Idling {
            self.pipeline.push_raw(b"DONE\r\n");
            self.state = ConnectionState::Connected;
        }
    }

    /// Applies a bracketed status code such as `UIDVALIDITY 42` to the
    /// mailbox being selected (or the current one).
    fn apply_status_code(&mut self, code: &str) {
        let Some(mbx) = self.selecting.as_mut().or(self.mailbox.as_mut()) else {
            return;
        };
        let (word, value) = match code.find(' ') {
            Some(i) => (&code[..i], code[i + 1..].trim()),
            None => (code, ""),
        };
        if word.eq_ignore_ascii_case("UIDVALIDITY") {
            if let Ok(n) = value.parse() {
                mbx.uid_validity = n;
            }
        } else if word.eq_ignore_ascii_case("UIDNEXT") {
            if let Ok(n) = value.parse() {
                mbx.uid_next = n;
            }
        }
    }

    // === Greeting chain ===

    fn request_capabilities(&mut self) {
        self.pipeline.submit(
            "CAPABILITY",
            Some(Box::new(
                |proto: &mut Self, resp: &TaggedResponse| {
                    if !resp.status.is_ok() {
                        proto.notify(Notification::CommandError(format!(
                            "CAPABILITY failed: {}",
                            resp.text
                        )));
                        return;
                    }
                    if !proto.proxied && !proto.secure && proto.caps.supports_starttls() {
                        proto.start_tls_upgrade();
                    } else {
                        proto.become_ready();
                    }
                },
            )),
        );
    }

    fn start_tls_upgrade(&mut self) {
        self.pipeline.submit(
            "STARTTLS",
            Some(Box::new(
                |proto: &mut Self, resp: &TaggedResponse| {
                    if resp.status.is_ok() {
                        proto.events.push(ProtocolEvent::UpgradeTls);
                    } else {
                        // Refusing the advertised upgrade leaves the
                        // connection unusable for credentials; surface it
                        // and let the application decide.
                        proto.notify(Notification::CommandError(format!(
                            "STARTTLS failed: {}",
                            resp.text
                        )));
                    }
                },
            )),
        );
    }

    fn become_ready(&mut self) {
        if self.ready_emitted {
            return;
        }
        self.ready_emitted = true;
        self.notify(Notification::Ready);
        if self.auto_login {
            self.login(None);
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.events.push(ProtocolEvent::Notify(notification));
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("state", &self.state)
            .field("authenticated", &self.authenticated)
            .field("secure", &self.secure)
            .field("greeting_seen", &self.greeting_seen)
            .field("pipeline", &self.pipeline)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

/// Wraps a reply channel into a "did the command succeed" callback.
fn success_callback(reply: Reply<Result<bool>>) -> Callback<Protocol> {
    Box::new(move |_proto: &mut Protocol, resp: &TaggedResponse| {
        let _ = reply.send(Ok(resp.status.is_ok()));
    })
}

/// Quotes a string argument, escaping `"` and `\`.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Builds the ID command, enforcing RFC 2971 field limits.
fn build_id_command(params: &[(String, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok("ID NIL".to_string());
    }
    if params.len() > 30 {
        return Err(Error::Validation(
            "max allowed number of ID fields is 30".to_string(),
        ));
    }
    let mut parts = Vec::with_capacity(params.len());
    for (key, value) in params {
        if key.len() > 30 {
            return Err(Error::Validation(
                "max allowed ID field length is 30".to_string(),
            ));
        }
        if value.len() > 1024 {
            return Err(Error::Validation(
                "max allowed ID value length is 1024".to_string(),
            ));
        }
        parts.push(format!(
            "\"{}\" \"{}\"",
            utf7::percent_escape(key),
            utf7::percent_escape(value)
        ));
    }
    Ok(format!("ID ({})", parts.join(" ")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> ImapConfig {
        ImapConfig::builder("imap.example.com")
            .credentials("user", "pass")
            .build()
    }

    fn config_no_autologin() -> ImapConfig {
        ImapConfig::builder("imap.example.com")
            .credentials("user", "pass")
            .auto_login(false)
            .build()
    }

    fn transmits(proto: &mut Protocol) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(t) = proto.poll_transmit() {
            out.push(String::from_utf8(t.data).unwrap());
        }
        out
    }

    fn notifications(events: &[ProtocolEvent]) -> Vec<&Notification> {
        events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Walks a fresh machine through greeting and capabilities to ready.
    fn make_ready(proto: &mut Protocol, caps_line: &str) -> Vec<ProtocolEvent> {
        proto.transport_connected();
        let mut events = proto.take_events();
        events.extend(proto.handle_input(b"* OK server ready\r\n"));
        assert_eq!(transmits(proto), vec!["A1 CAPABILITY\r\n"]);
        events.extend(proto.handle_input(format!("{caps_line}\r\nA1 OK done\r\n").as_bytes()));
        events
    }

    #[test]
    fn greeting_triggers_capability_then_starttls() {
        let mut proto = Protocol::new(&config());
        proto.transport_connected();
        let _ = proto.take_events();

        let events = proto.handle_input(b"* OK server ready\r\n");
        assert!(notifications(&events).is_empty());
        assert_eq!(transmits(&mut proto), vec!["A1 CAPABILITY\r\n"]);

        let events =
            proto.handle_input(b"* CAPABILITY IMAP4rev1 STARTTLS IDLE\r\nA1 OK done\r\n");
        assert!(notifications(&events).is_empty());
        assert_eq!(transmits(&mut proto), vec!["A2 STARTTLS\r\n"]);

        let events = proto.handle_input(b"A2 OK begin TLS\r\n");
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProtocolEvent::UpgradeTls))
        );

        // The driver swaps the transport, then reports back.
        proto.tls_established();
        let events = proto.take_events();
        assert!(
            notifications(&events)
                .iter()
                .any(|n| matches!(n, Notification::Ready))
        );
        // Auto-login fires once ready.
        assert_eq!(
            transmits(&mut proto),
            vec!["A3 LOGIN \"user\" \"pass\"\r\n"]
        );
    }

    #[test]
    fn no_starttls_goes_straight_to_ready() {
        let mut proto = Protocol::new(&config());
        let events = make_ready(&mut proto, "* CAPABILITY IMAP4rev1 IDLE");
        assert!(
            notifications(&events)
                .iter()
                .any(|n| matches!(n, Notification::Ready))
        );
        assert_eq!(
            transmits(&mut proto),
            vec!["A2 LOGIN \"user\" \"pass\"\r\n"]
        );

        let events = proto.handle_input(b"A2 OK logged in\r\n");
        assert!(proto.is_authenticated());
        assert!(
            notifications(&events)
                .iter()
                .any(|n| matches!(n, Notification::Login { ok: true, .. }))
        );
    }

    #[test]
    fn ready_is_emitted_once() {
        let mut proto = Protocol::new(&config_no_autologin());
        let events = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");
        let ready_count = notifications(&events)
            .iter()
            .filter(|n| matches!(n, Notification::Ready))
            .count();
        assert_eq!(ready_count, 1);

        // A later untagged OK with an idle pipeline is not a second greeting.
        let events = proto.handle_input(b"* OK still here\r\n");
        assert!(notifications(&events).is_empty());
        assert!(transmits(&mut proto).is_empty());
    }

    #[test]
    fn login_failure_is_a_value() {
        let mut proto = Protocol::new(&config_no_autologin());
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");
        let _ = transmits(&mut proto);

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.login(Some(tx));
        assert_eq!(
            transmits(&mut proto),
            vec!["A2 LOGIN \"user\" \"pass\"\r\n"]
        );

        let events = proto.handle_input(b"A2 NO [AUTHENTICATIONFAILED] bad credentials\r\n");
        assert!(matches!(rx.try_recv(), Ok(Ok(false))));
        assert!(!proto.is_authenticated());
        assert!(notifications(&events).iter().any(|n| matches!(
            n,
            Notification::Login { ok: false, text: Some(t) } if t == "bad credentials"
        )));
    }

    #[test]
    fn login_is_idempotent_once_authenticated() {
        let mut proto = Protocol::new(&config());
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"A2 OK logged in\r\n");

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.login(Some(tx));
        assert!(matches!(rx.try_recv(), Ok(Ok(true))));
        // No further round trip.
        assert!(transmits(&mut proto).is_empty());
    }

    #[test]
    fn credentials_are_escaped() {
        let cfg = ImapConfig::builder("h")
            .credentials("u\"ser", "p\\ass")
            .auto_login(false)
            .build();
        let mut proto = Protocol::new(&cfg);
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");
        proto.login(None);
        let written = transmits(&mut proto);
        assert_eq!(written[0], "A2 LOGIN \"u\\\"ser\" \"p\\\\ass\"\r\n");
    }

    fn authenticated_proto() -> Protocol {
        let mut proto = Protocol::new(&config());
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1 IDLE");
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"A2 OK logged in\r\n");
        proto
    }

    fn selected_proto() -> Protocol {
        let mut proto = authenticated_proto();
        let (tx, _rx) = tokio::sync::oneshot::channel();
        proto.open_box("INBOX", false, Some(tx));
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(
            b"* 3 EXISTS\r\n* FLAGS (\\Seen \\Deleted)\r\n* OK [UIDVALIDITY 42] ok\r\n* OK [UIDNEXT 100] ok\r\nA3 OK [READ-WRITE] done\r\n",
        );
        proto
    }

    #[test]
    fn open_box_resolves_with_snapshot() {
        let mut proto = authenticated_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.open_box("INBOX", false, Some(tx));
        assert_eq!(
            transmits(&mut proto),
            vec!["A3 SELECT \"INBOX\"\r\n"]
        );

        let _ = proto.handle_input(
            b"* 3 EXISTS\r\n* OK [UIDVALIDITY 42] ok\r\n* OK [UIDNEXT 100] ok\r\nA3 OK [READ-WRITE] done\r\n",
        );
        let snapshot = rx.try_recv().unwrap().unwrap();
        assert_eq!(snapshot.name, "INBOX");
        assert_eq!(snapshot.messages.total, 3);
        assert_eq!(snapshot.uid_validity, 42);
        assert_eq!(snapshot.uid_next, 100);
        assert!(!snapshot.read_only);
        assert_eq!(proto.mailbox().unwrap().messages.total, 3);
    }

    #[test]
    fn open_box_failure_rejects_with_server_text() {
        let mut proto = authenticated_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.open_box("Nope", false, Some(tx));
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"A3 NO no such mailbox\r\n");

        match rx.try_recv().unwrap() {
            Err(Error::Command(text)) => assert_eq!(text, "no such mailbox"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(proto.mailbox().is_none());
    }

    #[test]
    fn open_box_encodes_the_name() {
        let mut proto = authenticated_proto();
        proto.open_box("Entwürfe", true, None);
        assert_eq!(
            transmits(&mut proto),
            vec!["A3 EXAMINE \"Entw&APw-rfe\"\r\n"]
        );
    }

    #[test]
    fn exists_delta_is_attributed_when_authenticated() {
        let mut proto = selected_proto();
        assert_eq!(proto.mailbox().unwrap().messages.total, 3);

        let events = proto.handle_input(b"* 5 EXISTS\r\n");
        let notes = notifications(&events);
        assert!(notes.iter().any(|n| matches!(
            n,
            Notification::Exists(MessageCounts { total: 5, new: 2 })
        )));
        assert_eq!(proto.mailbox().unwrap().messages.new, 2);
    }

    #[test]
    fn exists_before_authentication_sets_no_new() {
        let mut proto = Protocol::new(&config_no_autologin());
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");
        let _ = transmits(&mut proto);
        // Stage a mailbox without being logged in.
        proto.open_box("INBOX", false, None);
        let _ = transmits(&mut proto);

        let events = proto.handle_input(b"* 7 EXISTS\r\n");
        assert!(notifications(&events).iter().any(|n| matches!(
            n,
            Notification::Exists(MessageCounts { total: 7, new: 0 })
        )));
    }

    #[test]
    fn total_only_increases_via_exists() {
        let mut proto = selected_proto();
        let _ = proto.handle_input(b"* 2 EXPUNGE\r\n");
        assert_eq!(proto.mailbox().unwrap().messages.total, 3);
    }

    #[test]
    fn idle_done_contract() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.idle(Some(tx));
        assert_eq!(transmits(&mut proto), vec!["A4 IDLE\r\n"]);

        let _ = proto.handle_input(b"+ idling\r\n");
        assert!(proto.is_idling());
        // The idle reply must not settle on the continuation.
        assert!(rx.try_recv().is_err());

        let _ = proto.handle_input(b"* 4 EXISTS\r\n");
        assert!(!proto.is_idling());
        assert_eq!(transmits(&mut proto), vec!["DONE\r\n"]);

        // A second EXISTS before the next IDLE writes nothing further.
        let _ = proto.handle_input(b"* 5 EXISTS\r\n");
        assert!(transmits(&mut proto).is_empty());

        // The tagged response terminates the IDLE command itself.
        let _ = proto.handle_input(b"A4 OK IDLE terminated\r\n");
        assert!(matches!(rx.try_recv(), Ok(Ok(true))));
    }

    #[test]
    fn search_uid_resolves_with_decoded_list() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.search_uid("1:*", Some(tx));
        assert_eq!(transmits(&mut proto), vec!["A4 UID SEARCH UID 1:*\r\n"]);

        let _ = proto.handle_input(b"* SEARCH 10 11 12\r\nA4 OK done\r\n");
        assert_eq!(rx.try_recv().unwrap().unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn search_failure_includes_command_text() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.search_uid("1:5", Some(tx));
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"A4 NO temporary failure\r\n");

        match rx.try_recv().unwrap() {
            Err(Error::Command(text)) => {
                assert_eq!(text, "UID SEARCH UID 1:5\ntemporary failure");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn search_uid_validates_before_sending() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.search_uid("0,abc", Some(tx));
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Validation(_))));
        assert!(transmits(&mut proto).is_empty());
    }

    #[test]
    fn structured_search_compiles_and_resolves() {
        use crate::search::SearchTerm;

        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let query = SearchQuery::new(vec![SearchTerm::Unseen, SearchTerm::Flagged]);
        proto.search(&query, Some(tx));
        assert_eq!(
            transmits(&mut proto),
            vec!["A4 UID SEARCH UNSEEN FLAGGED\r\n"]
        );

        let _ = proto.handle_input(b"* SEARCH 2\r\nA4 OK done\r\n");
        assert_eq!(rx.try_recv().unwrap().unwrap(), vec![2]);
    }

    #[test]
    fn structured_search_gating_fails_before_send() {
        use crate::search::SearchTerm;

        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let query = SearchQuery::new(vec![SearchTerm::ModSeq(9)]);
        proto.search(&query, Some(tx));

        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Validation(_))));
        assert!(transmits(&mut proto).is_empty());
    }

    #[test]
    fn condstore_search_records_modseq() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.search_uid("1:*", Some(tx));
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"* SEARCH 4 9 (MODSEQ 917162500)\r\nA4 OK done\r\n");

        assert_eq!(rx.try_recv().unwrap().unwrap(), vec![4, 9]);
        assert_eq!(proto.last_search_modseq(), Some(917_162_500));
    }

    #[test]
    fn fetch_bodies_are_decoupled_from_completion() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.fetch_uid(&[7], Some(tx));
        assert_eq!(
            transmits(&mut proto),
            vec!["A4 UID FETCH 7 (UID FLAGS INTERNALDATE BODYSTRUCTURE BODY[])\r\n"]
        );

        let events = proto.handle_input(b"* 3 FETCH (UID 7 BODY[] {11})\r\nhello world");
        let bodies: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::MailBody { uid, data } => Some((uid.unwrap().get(), data.clone())),
                ProtocolEvent::Notify(_) | ProtocolEvent::UpgradeTls => None,
            })
            .collect();
        assert_eq!(bodies, vec![(7, b"hello world".to_vec())]);
        // Body delivered, command not yet complete.
        assert!(rx.try_recv().is_err());

        let _ = proto.handle_input(b"A4 OK fetch done\r\n");
        assert!(matches!(rx.try_recv(), Ok(Ok(true))));
    }

    #[test]
    fn fetch_uid_rejects_zero() {
        let mut proto = selected_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.fetch_uid(&[0], Some(tx));
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Validation(_))));
    }

    #[test]
    fn untagged_no_without_command_is_surfaced() {
        let mut proto = Protocol::new(&config_no_autologin());
        let _ = make_ready(&mut proto, "* CAPABILITY IMAP4rev1");

        let events = proto.handle_input(b"* NO something went wrong\r\n");
        assert!(notifications(&events).iter().any(|n| matches!(
            n,
            Notification::CommandError(t) if t.contains("something went wrong")
        )));
    }

    #[test]
    fn bye_is_forwarded() {
        let mut proto = selected_proto();
        let events = proto.handle_input(b"* BYE server shutting down\r\n");
        assert!(notifications(&events).iter().any(|n| matches!(
            n,
            Notification::Bye(t) if t == "server shutting down"
        )));
    }

    #[test]
    fn recent_updates_new_count() {
        let mut proto = selected_proto();
        let events = proto.handle_input(b"* 2 RECENT\r\n");
        assert!(
            notifications(&events)
                .iter()
                .any(|n| matches!(n, Notification::Recent(2)))
        );
        assert_eq!(proto.mailbox().unwrap().messages.new, 2);
    }

    #[test]
    fn logout_clears_authenticated() {
        let mut proto = authenticated_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.logout(Some(tx));
        let _ = transmits(&mut proto);
        let _ = proto.handle_input(b"* BYE bye\r\nA3 OK done\r\n");

        assert!(matches!(rx.try_recv(), Ok(Ok(true))));
        assert!(!proto.is_authenticated());
    }

    #[test]
    fn destroy_is_idempotent_and_discards_callbacks() {
        let mut proto = authenticated_proto();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        proto.noop(Some(tx));
        let _ = transmits(&mut proto);

        proto.destroy();
        let events = proto.take_events();
        assert_eq!(
            notifications(&events)
                .iter()
                .filter(|n| matches!(n, Notification::Destroyed))
                .count(),
            1
        );
        // The pending reply channel closed without a value.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));

        proto.destroy();
        assert!(proto.take_events().is_empty());
    }

    #[test]
    fn queued_operations_complete_in_submission_order() {
        let mut proto = selected_proto();
        let (tx1, mut rx1) = tokio::sync::oneshot::channel();
        let (tx2, mut rx2) = tokio::sync::oneshot::channel();
        proto.noop(Some(tx1));
        proto.search_uid("1:*", Some(tx2));

        // Only the NOOP hit the wire.
        assert_eq!(transmits(&mut proto), vec!["A4 NOOP\r\n"]);
        let _ = proto.handle_input(b"A4 OK done\r\n");
        assert!(matches!(rx1.try_recv(), Ok(Ok(true))));

        assert_eq!(transmits(&mut proto), vec!["A5 UID SEARCH UID 1:*\r\n"]);
        let _ = proto.handle_input(b"* SEARCH 10 11 12\r\nA5 OK done\r\n");
        assert_eq!(rx2.try_recv().unwrap().unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn id_command_validates_and_serializes() {
        let mut proto = authenticated_proto();
        proto.id(&[], None);
        assert_eq!(transmits(&mut proto), vec!["A3 ID NIL\r\n"]);

        proto.id(
            &[("name".to_string(), "mailwatch".to_string())],
            None,
        );
        let _ = proto.handle_input(b"A3 OK done\r\n");
        assert_eq!(
            transmits(&mut proto),
            vec!["A4 ID (\"name\" \"mailwatch\")\r\n"]
        );

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let oversized = vec![("k".repeat(31), "v".to_string())];
        proto.id(&oversized, Some(tx));
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Validation(_))));
    }
}
