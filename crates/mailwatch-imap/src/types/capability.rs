//! Server capabilities and tagged response status.

use std::collections::HashSet;

/// Result status from a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
}

impl Status {
    /// Parses a status keyword, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("OK") {
            Some(Self::Ok)
        } else if s.eq_ignore_ascii_case("NO") {
            Some(Self::No)
        } else if s.eq_ignore_ascii_case("BAD") {
            Some(Self::Bad)
        } else {
            None
        }
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// IDLE command support (RFC 2177)
    Idle,
    /// STARTTLS support
    StartTls,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// Gmail extensions (`X-GM-EXT-1`)
    GmExt1,
    /// ID extension (RFC 2971)
    Id,
    /// SORT extension (RFC 5256)
    Sort,
    /// LOGIN disabled
    LoginDisabled,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability, kept verbatim (uppercased).
    Unknown(String),
}

impl Capability {
    /// Parses a capability token.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IDLE" => Self::Idle,
            "STARTTLS" => Self::StartTls,
            "CONDSTORE" => Self::CondStore,
            "X-GM-EXT-1" => Self::GmExt1,
            "ID" => Self::Id,
            "SORT" => Self::Sort,
            "LOGINDISABLED" => Self::LoginDisabled,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => Self::Unknown(upper),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Idle => write!(f, "IDLE"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::GmExt1 => write!(f, "X-GM-EXT-1"),
            Self::Id => write!(f, "ID"),
            Self::Sort => write!(f, "SORT"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The set of capabilities the server currently advertises.
///
/// Replaced wholesale every time a CAPABILITY response arrives; names are
/// uppercased on entry so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    caps: HashSet<Capability>,
}

impl CapabilitySet {
    /// Creates an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set with the given capability tokens.
    pub fn replace<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.caps = names
            .into_iter()
            .map(|s| Capability::parse(s.as_ref()))
            .collect();
    }

    /// Returns true if the given capability is advertised.
    #[must_use]
    pub fn contains(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Returns true if no CAPABILITY response has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Returns true if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.contains(&Capability::Idle)
    }

    /// Returns true if the server advertises STARTTLS.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.contains(&Capability::StartTls)
    }

    /// Returns true if the server supports CONDSTORE (RFC 7162).
    #[must_use]
    pub fn supports_condstore(&self) -> bool {
        self.contains(&Capability::CondStore)
    }

    /// Returns true if the server supports the Gmail extensions.
    #[must_use]
    pub fn supports_gm_ext(&self) -> bool {
        self.contains(&Capability::GmExt1)
    }

    /// Iterates over the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_case_insensitive() {
        assert_eq!(Status::parse("ok"), Some(Status::Ok));
        assert_eq!(Status::parse("No"), Some(Status::No));
        assert_eq!(Status::parse("BAD"), Some(Status::Bad));
        assert_eq!(Status::parse("PREAUTH"), None);
    }

    #[test]
    fn capability_parse() {
        assert_eq!(Capability::parse("idle"), Capability::Idle);
        assert_eq!(Capability::parse("STARTTLS"), Capability::StartTls);
        assert_eq!(Capability::parse("X-GM-EXT-1"), Capability::GmExt1);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("QUOTA"),
            Capability::Unknown("QUOTA".to_string())
        );
    }

    #[test]
    fn replace_is_wholesale() {
        let mut set = CapabilitySet::new();
        set.replace(["IMAP4rev1", "STARTTLS", "IDLE"]);
        assert!(set.supports_starttls());
        assert!(set.supports_idle());

        set.replace(["IMAP4rev1", "IDLE"]);
        assert!(!set.supports_starttls());
        assert!(set.supports_idle());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut set = CapabilitySet::new();
        set.replace(["idle", "x-gm-ext-1"]);
        assert!(set.supports_idle());
        assert!(set.supports_gm_ext());
    }
}
