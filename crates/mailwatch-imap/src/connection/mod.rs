//! Connection driver and public operation surface.
//!
//! One [`ImapConnection`] owns one server connection. All I/O and protocol
//! state live in a single actor task: it reads the socket, feeds the
//! sans-I/O [`Protocol`], transmits its output, performs the STARTTLS swap,
//! and applies timeouts. Public operations post into the actor over a
//! channel and await their tagged-response completions, so every inbound
//! event — bytes, operations, timers — serializes through one loop and
//! reentrant transitions cannot interleave.
//!
//! Operations issued before earlier ones settle are queued behind them, in
//! submission order. Operations issued after teardown fail fast with
//! [`Error::NotConnected`]; operations pending at teardown observe
//! [`Error::Destroyed`].

mod stream;

pub use stream::{AsyncDuplex, ImapStream, connect_plain, connect_tls, connect_via_proxy, tls_connector};

use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::config::ImapConfig;
use crate::error::{Error, Result};
use crate::events::{Dispatcher, MailResult, Notification};
use crate::mime::{BasicDecoder, MailDecoder};
use crate::protocol::{Protocol, ProtocolEvent, Reply};
use crate::search::SearchQuery;
use crate::types::{CapabilitySet, MailboxState};

/// Point-in-time view of the session model.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// True once LOGIN succeeded.
    pub authenticated: bool,
    /// True while the server is in IDLE-streaming mode.
    pub idling: bool,
    /// Advertised capabilities.
    pub capabilities: CapabilitySet,
    /// Selected mailbox, if any.
    pub mailbox: Option<MailboxState>,
}

/// Operations posted into the actor.
enum Op {
    Login(Reply<Result<bool>>),
    OpenBox {
        name: String,
        read_only: bool,
        reply: Reply<Result<MailboxState>>,
    },
    SearchUid {
        range: String,
        reply: Reply<Result<Vec<u32>>>,
    },
    Search {
        query: SearchQuery,
        reply: Reply<Result<Vec<u32>>>,
    },
    FetchUid {
        uids: Vec<u32>,
        reply: Reply<Result<bool>>,
    },
    Id {
        params: Vec<(String, String)>,
        reply: Reply<Result<bool>>,
    },
    Noop(Reply<Result<bool>>),
    Logout(Reply<Result<bool>>),
    Idle(Reply<Result<bool>>),
    Snapshot(Reply<SessionSnapshot>),
    Destroy(Reply<()>),
}

/// Handle to one IMAP connection.
///
/// Cheap to clone; all clones drive the same connection. Dropping every
/// clone tears the connection down.
#[derive(Clone)]
pub struct ImapConnection {
    ops: mpsc::UnboundedSender<Op>,
    config: ImapConfig,
}

impl ImapConnection {
    /// Connects with default handlers and the bundled [`BasicDecoder`].
    pub async fn connect(config: ImapConfig) -> Result<Self> {
        Self::connect_with(config, Dispatcher::new(), Box::new(BasicDecoder)).await
    }

    /// Connects with the given notification handlers and mail decoder.
    ///
    /// Dials the proxy tunnel + TLS when a proxy is configured, implicit TLS
    /// when `tls` is set, and plaintext (server-dictated STARTTLS) otherwise.
    /// The connect timeout bounds the whole establishment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Proxy`] when the SOCKS dial fails, [`Error::Timeout`]
    /// when establishment exceeds the connect timeout, and I/O or TLS errors
    /// otherwise. The matching notification is dispatched before returning.
    pub async fn connect_with(
        config: ImapConfig,
        mut dispatcher: Dispatcher,
        decoder: Box<dyn MailDecoder>,
    ) -> Result<Self> {
        let stream = establish(&config, &mut dispatcher).await?;
        Ok(Self::spawn(stream, config, dispatcher, decoder))
    }

    /// Drives a caller-supplied transport instead of dialing.
    ///
    /// The greeting is expected on `stream` like on any other transport.
    /// Useful for tests and pre-connected sockets; STARTTLS works on it too.
    pub fn from_stream<S>(
        stream: S,
        config: ImapConfig,
        dispatcher: Dispatcher,
        decoder: Box<dyn MailDecoder>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::spawn(ImapStream::boxed(stream), config, dispatcher, decoder)
    }

    fn spawn(
        stream: ImapStream,
        config: ImapConfig,
        dispatcher: Dispatcher,
        decoder: Box<dyn MailDecoder>,
    ) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let mut actor = Actor {
            stream: Some(stream),
            protocol: Protocol::new(&config),
            dispatcher,
            decoder,
            ops: ops_rx,
            config: config.clone(),
        };
        actor.protocol.transport_connected();
        tokio::spawn(actor.run());

        Self {
            ops: ops_tx,
            config,
        }
    }

    /// The configuration this connection was created with.
    #[must_use]
    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    /// Logs in with the configured credentials.
    ///
    /// Resolves `Ok(false)` when the server rejects the credentials; the
    /// rejection text arrives in the login notification. Idempotent once
    /// authenticated. Bounded by the auth timeout.
    pub async fn login(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Login(tx))?;
        match tokio::time::timeout(self.config.auth_timeout, rx).await {
            Ok(reply) => reply.map_err(|_| Error::Destroyed)?,
            Err(_) => Err(Error::Timeout(self.config.auth_timeout)),
        }
    }

    /// Selects (or examines, when `read_only`) a mailbox and returns its
    /// fresh state snapshot.
    pub async fn open_box(&self, name: &str, read_only: bool) -> Result<MailboxState> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::OpenBox {
            name: name.to_string(),
            read_only,
            reply: tx,
        })?;
        wait(rx).await
    }

    /// Searches by uid range (`ALL`-style ranges such as `100:200`, `100:*`).
    pub async fn search_uid(&self, range: &str) -> Result<Vec<u32>> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::SearchUid {
            range: range.to_string(),
            reply: tx,
        })?;
        wait(rx).await
    }

    /// Searches with a structured query.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<u32>> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Search { query, reply: tx })?;
        wait(rx).await
    }

    /// Fetches full bodies for the given uids.
    ///
    /// Bodies surface as mail notifications as they decode; the returned
    /// future resolves when the server has finished sending.
    pub async fn fetch_uid(&self, uids: &[u32]) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::FetchUid {
            uids: uids.to_vec(),
            reply: tx,
        })?;
        wait(rx).await
    }

    /// Sends RFC 2971 client identification.
    pub async fn id(&self, params: &[(String, String)]) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Id {
            params: params.to_vec(),
            reply: tx,
        })?;
        wait(rx).await
    }

    /// Sends NOOP; resolves with the success boolean.
    pub async fn noop(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Noop(tx))?;
        wait(rx).await
    }

    /// Sends LOGOUT; clears the authenticated state on success.
    pub async fn logout(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Logout(tx))?;
        wait(rx).await
    }

    /// Enters IDLE.
    ///
    /// Resolves once the idle terminates (after the EXISTS-triggered DONE),
    /// not on the EXISTS events streamed meanwhile — those arrive as
    /// notifications.
    pub async fn idle(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Idle(tx))?;
        wait(rx).await
    }

    /// Returns a point-in-time view of the session model.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Op::Snapshot(tx))?;
        rx.await.map_err(|_| Error::Destroyed)
    }

    /// Returns true once LOGIN succeeded.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.snapshot().await?.authenticated)
    }

    /// Returns true if the server advertises IDLE.
    pub async fn supports_idle(&self) -> Result<bool> {
        Ok(self.snapshot().await?.capabilities.supports_idle())
    }

    /// Tears the connection down.
    ///
    /// Idempotent. Operations pending at this point are discarded — their
    /// futures observe [`Error::Destroyed`], never a fabricated result.
    pub async fn destroy(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.ops.send(Op::Destroy(tx)).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    fn send(&self, op: Op) -> Result<()> {
        self.ops.send(op).map_err(|_| Error::NotConnected)
    }
}

impl std::fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("host", &self.config.host)
            .finish_non_exhaustive()
    }
}

async fn wait<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    rx.await.map_err(|_| Error::Destroyed)?
}

/// Dials the transport per configuration, bounded by the connect timeout.
async fn establish(config: &ImapConfig, dispatcher: &mut Dispatcher) -> Result<ImapStream> {
    let attempt = async {
        if let Some(proxy) = &config.proxy {
            connect_via_proxy(
                proxy,
                &config.host,
                config.tls_port,
                config.tls_config.as_ref(),
            )
            .await
        } else if config.tls {
            connect_tls(&config.host, config.tls_port, config.tls_config.as_ref()).await
        } else {
            connect_plain(&config.host, config.port).await
        }
    };

    match tokio::time::timeout(config.connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => {
            match &err {
                Error::Proxy(_) => {
                    dispatcher.dispatch(&Notification::ProxyError(err.to_string()));
                }
                _ => dispatcher.dispatch(&Notification::SocketError(err.to_string())),
            }
            Err(err)
        }
        Err(_) => {
            dispatcher.dispatch(&Notification::Timeout);
            Err(Error::Timeout(config.connect_timeout))
        }
    }
}

/// Teardown cause; each kind notifies the application exactly once.
enum Fault {
    Ended,
    Socket(String),
    Timeout,
}

/// What woke the actor loop.
enum Wake {
    Read(io::Result<usize>),
    Op(Option<Op>),
    IdleTimeout,
    Keepalive,
}

/// The per-connection actor: sole owner of socket, parser, and protocol.
struct Actor {
    stream: Option<ImapStream>,
    protocol: Protocol,
    dispatcher: Dispatcher,
    decoder: Box<dyn MailDecoder>,
    ops: mpsc::UnboundedReceiver<Op>,
    config: ImapConfig,
}

impl Actor {
    async fn run(mut self) {
        // Deliver the Connected notification queued before spawn.
        let events = self.protocol.take_events();
        if !self.process(events).await || !self.flush().await {
            return;
        }

        let mut read_buf = vec![0u8; 8192];
        loop {
            let wake = {
                let Some(stream) = self.stream.as_mut() else {
                    break;
                };
                tokio::select! {
                    read = stream.read(&mut read_buf) => Wake::Read(read),
                    op = self.ops.recv() => Wake::Op(op),
                    () = tokio::time::sleep(self.config.socket_timeout) => Wake::IdleTimeout,
                    () = tokio::time::sleep(self.config.keepalive_interval),
                        if self.config.keepalive => Wake::Keepalive,
                }
            };

            match wake {
                Wake::Read(Ok(0)) => {
                    self.fault(&Fault::Ended);
                    break;
                }
                Wake::Read(Ok(n)) => {
                    self.dispatcher
                        .dispatch(&Notification::Raw(read_buf[..n].to_vec()));
                    let events = self.protocol.handle_input(&read_buf[..n]);
                    if !self.process(events).await || !self.flush().await {
                        break;
                    }
                }
                Wake::Read(Err(err)) => {
                    self.fault(&Fault::Socket(err.to_string()));
                    break;
                }
                Wake::Op(Some(op)) => {
                    let keep_going = self.handle_op(op);
                    let events = self.protocol.take_events();
                    if !self.process(events).await || !self.flush().await {
                        break;
                    }
                    if !keep_going {
                        self.stream = None;
                        break;
                    }
                }
                Wake::Op(None) => {
                    // Every handle dropped; tear down quietly.
                    self.protocol.destroy();
                    let events = self.protocol.take_events();
                    let _ = self.process(events).await;
                    break;
                }
                Wake::IdleTimeout => {
                    self.fault(&Fault::Timeout);
                    break;
                }
                Wake::Keepalive => {
                    tracing::trace!("keepalive NOOP");
                    self.protocol.noop(None);
                    let events = self.protocol.take_events();
                    if !self.process(events).await || !self.flush().await {
                        break;
                    }
                }
            }
        }
    }

    /// Applies one operation; returns false when the loop should stop.
    fn handle_op(&mut self, op: Op) -> bool {
        match op {
            Op::Login(reply) => self.protocol.login(Some(reply)),
            Op::OpenBox {
                name,
                read_only,
                reply,
            } => self.protocol.open_box(&name, read_only, Some(reply)),
            Op::SearchUid { range, reply } => self.protocol.search_uid(&range, Some(reply)),
            Op::Search { query, reply } => self.protocol.search(&query, Some(reply)),
            Op::FetchUid { uids, reply } => self.protocol.fetch_uid(&uids, Some(reply)),
            Op::Id { params, reply } => self.protocol.id(&params, Some(reply)),
            Op::Noop(reply) => self.protocol.noop(Some(reply)),
            Op::Logout(reply) => self.protocol.logout(Some(reply)),
            Op::Idle(reply) => self.protocol.idle(Some(reply)),
            Op::Snapshot(reply) => {
                let _ = reply.send(SessionSnapshot {
                    authenticated: self.protocol.is_authenticated(),
                    idling: self.protocol.is_idling(),
                    capabilities: self.protocol.capabilities().clone(),
                    mailbox: self.protocol.mailbox().cloned(),
                });
            }
            Op::Destroy(reply) => {
                self.protocol.destroy();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Handles protocol events, including the STARTTLS transport swap.
    async fn process(&mut self, events: Vec<ProtocolEvent>) -> bool {
        let mut queue: VecDeque<ProtocolEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            match event {
                ProtocolEvent::Notify(notification) => self.dispatcher.dispatch(&notification),
                ProtocolEvent::MailBody { uid, data } => {
                    let mail = self.decoder.decode(&data);
                    self.dispatcher
                        .dispatch(&Notification::Mail(MailResult { uid, mail }));
                }
                ProtocolEvent::UpgradeTls => {
                    let Some(stream) = self.stream.take() else {
                        return false;
                    };
                    match stream
                        .upgrade_to_tls(&self.config.host, self.config.tls_config.as_ref())
                        .await
                    {
                        Ok(tls) => {
                            tracing::debug!("transport upgraded to TLS");
                            self.stream = Some(tls);
                            self.protocol.tls_established();
                            queue.extend(self.protocol.take_events());
                        }
                        Err(err) => {
                            self.fault(&Fault::Socket(format!("TLS upgrade failed: {err}")));
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Writes pending frames; returns false on a transport fault.
    async fn flush(&mut self) -> bool {
        while let Some(transmit) = self.protocol.poll_transmit() {
            let Some(stream) = self.stream.as_mut() else {
                return false;
            };
            if let Err(err) = stream.write_all(&transmit.data).await {
                self.fault(&Fault::Socket(err.to_string()));
                return false;
            }
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(err) = stream.flush().await {
                self.fault(&Fault::Socket(err.to_string()));
                return false;
            }
        }
        true
    }

    /// The single teardown path for transport faults.
    ///
    /// Destroys the protocol (discarding pending commands), then notifies
    /// the application once for the fault kind.
    fn fault(&mut self, fault: &Fault) {
        self.protocol.destroy();
        for event in self.protocol.take_events() {
            if let ProtocolEvent::Notify(notification) = event {
                self.dispatcher.dispatch(&notification);
            }
        }
        match fault {
            Fault::Ended => {
                self.dispatcher.dispatch(&Notification::Ended);
                self.dispatcher
                    .dispatch(&Notification::Closed { had_error: false });
            }
            Fault::Socket(text) => {
                self.dispatcher
                    .dispatch(&Notification::SocketError(text.clone()));
                self.dispatcher
                    .dispatch(&Notification::Closed { had_error: true });
            }
            Fault::Timeout => self.dispatcher.dispatch(&Notification::Timeout),
        }
        self.stream = None;
    }
}
