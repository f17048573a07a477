//! Core IMAP types.
//!
//! Fundamental types used throughout the engine: message identifiers,
//! capability tracking, and the selected-mailbox session model.

mod capability;
mod identifiers;
mod mailbox;

pub use capability::{Capability, CapabilitySet, Status};
pub use identifiers::{SeqNum, Uid};
pub use mailbox::{MailboxState, MessageCounts};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_reject_zero() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert_eq!(Uid::new(123).unwrap().get(), 123);
    }

    #[test]
    fn status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bad.is_ok());
    }
}
