//! Command pipelining with a single command in flight.
//!
//! IMAP correlates commands and their terminal responses through tags. This
//! engine keeps exactly one command on the wire at a time (RFC 3501 clients
//! may pipeline, but responses to overlapping commands are ambiguous for the
//! subset we speak); anything submitted while a command is outstanding waits
//! in a FIFO queue.
//!
//! The pipeline is sans-I/O: submitting a command enqueues a [`Transmit`]
//! frame, and the I/O driver drains them with [`Pipeline::poll_transmit`].
//!
//! Completion order is: clear busy, invoke the tag's callback, then write the
//! queued head. The callback receives `&mut Cx` (the owning state machine),
//! so it may submit follow-ups synchronously; those are written immediately,
//! ahead of commands that were already queued.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::parser::TaggedResponse;

/// Data to transmit to the server.
///
/// The protocol layer produces these; the I/O layer is the single writer
/// that actually sends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Raw bytes to send to the server.
    pub data: Vec<u8>,
}

impl Transmit {
    /// Creates a new transmit from bytes.
    #[must_use]
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns the data as a string slice, if valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl AsRef<[u8]> for Transmit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Callback invoked when a command's tagged response arrives.
///
/// `Cx` is the state machine that owns the pipeline; the callback may mutate
/// it and submit follow-up commands through it.
pub type Callback<Cx> = Box<dyn FnOnce(&mut Cx, &TaggedResponse) + Send>;

/// The command currently awaiting its tagged response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// Tag written on the wire.
    pub tag: u32,
    /// Command text without tag or CRLF.
    pub text: String,
}

/// A command waiting for the wire to become free.
///
/// No tag is assigned until the command is actually written, so tags on the
/// wire are always exactly 1..N in write order.
struct QueuedCommand<Cx> {
    text: String,
    callback: Option<Callback<Cx>>,
}

/// Single-flight command pipeline.
pub struct Pipeline<Cx> {
    next_tag: u32,
    in_flight: Option<InFlight>,
    queue: VecDeque<QueuedCommand<Cx>>,
    callbacks: HashMap<u32, Callback<Cx>>,
    outbound: VecDeque<Transmit>,
}

impl<Cx> Default for Pipeline<Cx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cx> Pipeline<Cx> {
    /// Creates an empty pipeline; the first tag written will be 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_tag: 1,
            in_flight: None,
            queue: VecDeque::new(),
            callbacks: HashMap::new(),
            outbound: VecDeque::new(),
        }
    }

    /// Submits a command.
    ///
    /// If nothing is in flight the command is written immediately; otherwise
    /// it joins the FIFO queue and is written when the wire frees up.
    pub fn submit(&mut self, text: impl Into<String>, callback: Option<Callback<Cx>>) {
        let text = text.into();
        if self.in_flight.is_none() {
            self.write(text, callback);
        } else {
            self.queue.push_back(QueuedCommand { text, callback });
        }
    }

    /// Assigns the next tag and queues the framed command for transmission.
    fn write(&mut self, text: String, callback: Option<Callback<Cx>>) {
        let tag = self.next_tag;
        self.next_tag += 1;

        tracing::debug!(tag, command = %text, "=>");
        self.outbound
            .push_back(Transmit::new(format!("A{tag} {text}\r\n").into_bytes()));
        if let Some(cb) = callback {
            self.callbacks.insert(tag, cb);
        }
        self.in_flight = Some(InFlight { tag, text });
    }

    /// Clears the busy state for a tagged response and removes its callback.
    ///
    /// The caller (the owning state machine) invokes the returned callback
    /// itself, then calls [`Pipeline::pump`] — that dance keeps the
    /// clear-busy → callback → dequeue ordering while letting the callback
    /// borrow the state machine mutably.
    pub fn complete(&mut self, tag: u32) -> Option<Callback<Cx>> {
        match self.in_flight.take() {
            Some(cmd) if cmd.tag == tag => {}
            Some(cmd) => {
                tracing::debug!(expected = cmd.tag, got = tag, "tagged response out of order");
            }
            None => tracing::debug!(tag, "tagged response with no command in flight"),
        }
        let callback = self.callbacks.remove(&tag);
        if callback.is_none() {
            // Fire-and-forget submissions are legal.
            tracing::trace!(tag, "no callback registered");
        }
        callback
    }

    /// Writes the queued head if the wire is free.
    pub fn pump(&mut self) {
        if self.in_flight.is_none() {
            if let Some(next) = self.queue.pop_front() {
                self.write(next.text, next.callback);
            }
        }
    }

    /// Returns the next frame to transmit, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.outbound.pop_front()
    }

    /// Queues raw bytes for transmission, bypassing the tag path.
    ///
    /// Used for IDLE termination, whose `DONE` is untagged.
    pub fn push_raw(&mut self, data: &[u8]) {
        self.outbound.push_back(Transmit::new(data.to_vec()));
    }

    /// Returns the command currently awaiting its tagged response.
    #[must_use]
    pub const fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// Returns true if a command is outstanding.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Returns the number of commands waiting in the queue.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns how many tags have been written so far.
    #[must_use]
    pub const fn tags_written(&self) -> u32 {
        self.next_tag - 1
    }

    /// Discards everything: queue, callbacks, outbound frames, busy state.
    ///
    /// Callbacks are dropped without being invoked; pending callers observe
    /// teardown through their reply channels, never a fabricated result.
    pub fn drain(&mut self) {
        self.in_flight = None;
        self.queue.clear();
        self.callbacks.clear();
        self.outbound.clear();
    }
}

impl<Cx> std::fmt::Debug for Pipeline<Cx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("next_tag", &self.next_tag)
            .field("in_flight", &self.in_flight)
            .field("queued", &self.queue.len())
            .field("callbacks", &self.callbacks.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}
