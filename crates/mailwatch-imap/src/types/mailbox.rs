//! Mailbox session state.

/// Message counters for the selected mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    /// Total number of messages (EXISTS).
    pub total: u32,
    /// Messages that arrived since the last count, or RECENT.
    ///
    /// Only attributed once the connection is authenticated.
    pub new: u32,
}

/// State of the currently selected mailbox.
///
/// Created on SELECT/EXAMINE and mutated incrementally by untagged
/// EXISTS/RECENT/FLAGS responses. Absent until a select succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxState {
    /// Mailbox name as given by the application (decoded form).
    pub name: String,
    /// True if opened with EXAMINE.
    pub read_only: bool,
    /// UIDVALIDITY value, 0 until reported.
    pub uid_validity: u32,
    /// Predicted next UID, 0 until reported.
    pub uid_next: u32,
    /// Flags defined for this mailbox.
    pub flags: Vec<String>,
    /// Message counters.
    pub messages: MessageCounts,
}

impl MailboxState {
    /// Creates a fresh mailbox state for a select in progress.
    #[must_use]
    pub fn new(name: impl Into<String>, read_only: bool) -> Self {
        Self {
            name: name.into(),
            read_only,
            uid_validity: 0,
            uid_next: 0,
            flags: Vec::new(),
            messages: MessageCounts::default(),
        }
    }
}
