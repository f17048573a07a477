//! Search expression compiler.
//!
//! Translates a structured search expression into the wire text that follows
//! `UID SEARCH`. Every argument is validated before any text is sent: dates
//! coerce to the `d-MMM-yyyy` wire form, uid/sequence sets reject
//! non-positive entries, and extension keywords require the matching server
//! capability.

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::types::CapabilitySet;

/// One element of a uid or sequence-number set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqToken {
    /// The highest message (`*`).
    Star,
    /// A single id.
    Single(u32),
    /// An inclusive range `a:b`.
    Range(u32, u32),
    /// An open range `n:*`.
    From(u32),
}

impl SeqToken {
    /// Parses one token, rejecting non-numeric and non-positive values.
    pub fn parse(token: &str) -> Result<Self> {
        if token == "*" || token == "*:*" {
            return Ok(Self::Star);
        }
        if let Some((lo, hi)) = token.split_once(':') {
            let lo = parse_positive(lo)?;
            if hi == "*" {
                return Ok(Self::From(lo));
            }
            return Ok(Self::Range(lo, parse_positive(hi)?));
        }
        parse_positive(token).map(Self::Single)
    }
}

impl std::fmt::Display for SeqToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Star => write!(f, "*"),
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(lo, hi) => write!(f, "{lo}:{hi}"),
            Self::From(lo) => write!(f, "{lo}:*"),
        }
    }
}

/// A validated, non-empty uid or sequence-number set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqSet(Vec<SeqToken>);

impl SeqSet {
    /// Builds a set from tokens, rejecting an empty list.
    pub fn new(tokens: Vec<SeqToken>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::Validation("empty uid/sequence list".to_string()));
        }
        Ok(Self(tokens))
    }

    /// Parses a comma-separated set such as `1,3:5,7:*`.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = text
            .split(',')
            .map(str::trim)
            .map(SeqToken::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }

    /// Builds a set from bare uids.
    pub fn from_ids(ids: &[u32]) -> Result<Self> {
        let tokens = ids
            .iter()
            .map(|&n| {
                if n == 0 {
                    Err(Error::Validation(
                        "uid/seqno must be greater than zero".to_string(),
                    ))
                } else {
                    Ok(SeqToken::Single(n))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }
}

impl std::fmt::Display for SeqSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // A star swallows everything else in the set.
        if self.0.len() > 1 && self.0.contains(&SeqToken::Star) {
            return write!(f, "*");
        }
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// One search criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// All messages.
    All,
    /// Messages with `\Answered`.
    Answered,
    /// Messages with `\Deleted`.
    Deleted,
    /// Messages with `\Draft`.
    Draft,
    /// Messages with `\Flagged`.
    Flagged,
    /// New messages (recent and unseen).
    New,
    /// Messages seen before this session.
    Old,
    /// Messages with `\Recent`.
    Recent,
    /// Messages with `\Seen`.
    Seen,
    /// Messages without `\Answered`.
    Unanswered,
    /// Messages without `\Deleted`.
    Undeleted,
    /// Messages without `\Draft`.
    Undraft,
    /// Messages without `\Flagged`.
    Unflagged,
    /// Messages without `\Seen`.
    Unseen,
    /// Bcc header contains text.
    Bcc(String),
    /// Body contains text.
    Body(String),
    /// Cc header contains text.
    Cc(String),
    /// From header contains text.
    From(String),
    /// Subject contains text.
    Subject(String),
    /// Header or body contains text.
    Text(String),
    /// To header contains text.
    To(String),
    /// Internal date before the day.
    Before(NaiveDate),
    /// Internal date within the day.
    On(NaiveDate),
    /// Date header before the day.
    SentBefore(NaiveDate),
    /// Date header within the day.
    SentOn(NaiveDate),
    /// Date header on or after the day.
    SentSince(NaiveDate),
    /// Internal date on or after the day.
    Since(NaiveDate),
    /// Messages with the keyword flag set.
    Keyword(String),
    /// Messages without the keyword flag.
    Unkeyword(String),
    /// Messages larger than the size in bytes.
    Larger(u32),
    /// Messages smaller than the size in bytes.
    Smaller(u32),
    /// Named header contains the value.
    Header(String, String),
    /// Messages with uids in the set.
    Uid(SeqSet),
    /// Messages with sequence numbers in the set.
    Seq(SeqSet),
    /// Gmail message id (requires `X-GM-EXT-1`).
    GmMsgId(u64),
    /// Gmail thread id (requires `X-GM-EXT-1`).
    GmThrId(u64),
    /// Gmail raw search syntax (requires `X-GM-EXT-1`).
    GmRaw(String),
    /// Gmail labels (requires `X-GM-EXT-1`).
    GmLabels(String),
    /// Mod-sequence floor (requires `CONDSTORE`).
    ModSeq(u64),
    /// Either sub-expression matches.
    Or(Box<SearchQuery>, Box<SearchQuery>),
    /// Negation of a criterion.
    Not(Box<SearchTerm>),
}

/// An ordered list of criteria, implicitly ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery(pub Vec<SearchTerm>);

impl SearchQuery {
    /// Builds a query from a list of terms.
    #[must_use]
    pub fn new(terms: Vec<SearchTerm>) -> Self {
        Self(terms)
    }

    /// Compiles the query to wire text, validating every argument first.
    ///
    /// `caps` gates extension keywords: Gmail terms need `X-GM-EXT-1`,
    /// `MODSEQ` needs `CONDSTORE`. Validation failures surface before any
    /// text reaches the wire.
    pub fn compile(&self, caps: &CapabilitySet) -> Result<String> {
        if self.0.is_empty() {
            return Err(Error::Validation("empty search query".to_string()));
        }
        let mut out = String::new();
        for (i, term) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write_term(&mut out, term, caps)?;
        }
        Ok(out)
    }
}

impl From<Vec<SearchTerm>> for SearchQuery {
    fn from(terms: Vec<SearchTerm>) -> Self {
        Self(terms)
    }
}

fn require_gm(caps: &CapabilitySet, keyword: &str) -> Result<()> {
    if caps.supports_gm_ext() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{keyword} requires the X-GM-EXT-1 extension"
        )))
    }
}

fn write_term(out: &mut String, term: &SearchTerm, caps: &CapabilitySet) -> Result<()> {
    match term {
        SearchTerm::All => out.push_str("ALL"),
        SearchTerm::Answered => out.push_str("ANSWERED"),
        SearchTerm::Deleted => out.push_str("DELETED"),
        SearchTerm::Draft => out.push_str("DRAFT"),
        SearchTerm::Flagged => out.push_str("FLAGGED"),
        SearchTerm::New => out.push_str("NEW"),
        SearchTerm::Old => out.push_str("OLD"),
        SearchTerm::Recent => out.push_str("RECENT"),
        SearchTerm::Seen => out.push_str("SEEN"),
        SearchTerm::Unanswered => out.push_str("UNANSWERED"),
        SearchTerm::Undeleted => out.push_str("UNDELETED"),
        SearchTerm::Undraft => out.push_str("UNDRAFT"),
        SearchTerm::Unflagged => out.push_str("UNFLAGGED"),
        SearchTerm::Unseen => out.push_str("UNSEEN"),

        SearchTerm::Bcc(s) => write_text_term(out, "BCC", s),
        SearchTerm::Body(s) => write_text_term(out, "BODY", s),
        SearchTerm::Cc(s) => write_text_term(out, "CC", s),
        SearchTerm::From(s) => write_text_term(out, "FROM", s),
        SearchTerm::Subject(s) => write_text_term(out, "SUBJECT", s),
        SearchTerm::Text(s) => write_text_term(out, "TEXT", s),
        SearchTerm::To(s) => write_text_term(out, "TO", s),

        SearchTerm::Before(d) => write_date_term(out, "BEFORE", *d),
        SearchTerm::On(d) => write_date_term(out, "ON", *d),
        SearchTerm::SentBefore(d) => write_date_term(out, "SENTBEFORE", *d),
        SearchTerm::SentOn(d) => write_date_term(out, "SENTON", *d),
        SearchTerm::SentSince(d) => write_date_term(out, "SENTSINCE", *d),
        SearchTerm::Since(d) => write_date_term(out, "SINCE", *d),

        SearchTerm::Keyword(k) => {
            out.push_str("KEYWORD ");
            out.push_str(k);
        }
        SearchTerm::Unkeyword(k) => {
            out.push_str("UNKEYWORD ");
            out.push_str(k);
        }
        SearchTerm::Larger(n) => {
            out.push_str("LARGER ");
            out.push_str(&n.to_string());
        }
        SearchTerm::Smaller(n) => {
            out.push_str("SMALLER ");
            out.push_str(&n.to_string());
        }
        SearchTerm::Header(name, value) => {
            out.push_str("HEADER ");
            write_string(out, name);
            out.push(' ');
            write_string(out, value);
        }
        SearchTerm::Uid(set) => {
            out.push_str("UID ");
            out.push_str(&set.to_string());
        }
        SearchTerm::Seq(set) => out.push_str(&set.to_string()),

        SearchTerm::GmMsgId(n) => {
            require_gm(caps, "X-GM-MSGID")?;
            out.push_str("X-GM-MSGID ");
            out.push_str(&n.to_string());
        }
        SearchTerm::GmThrId(n) => {
            require_gm(caps, "X-GM-THRID")?;
            out.push_str("X-GM-THRID ");
            out.push_str(&n.to_string());
        }
        SearchTerm::GmRaw(s) => {
            require_gm(caps, "X-GM-RAW")?;
            out.push_str("X-GM-RAW ");
            write_string(out, s);
        }
        SearchTerm::GmLabels(s) => {
            require_gm(caps, "X-GM-LABELS")?;
            out.push_str("X-GM-LABELS ");
            out.push_str(s);
        }
        SearchTerm::ModSeq(n) => {
            if !caps.supports_condstore() {
                return Err(Error::Validation(
                    "MODSEQ requires the CONDSTORE extension".to_string(),
                ));
            }
            out.push_str("MODSEQ ");
            out.push_str(&n.to_string());
        }

        SearchTerm::Or(a, b) => {
            out.push_str("OR (");
            out.push_str(&a.compile(caps)?);
            out.push_str(") (");
            out.push_str(&b.compile(caps)?);
            out.push(')');
        }
        SearchTerm::Not(inner) => {
            out.push_str("NOT ");
            write_term(out, inner, caps)?;
        }
    }
    Ok(())
}

fn write_text_term(out: &mut String, keyword: &str, value: &str) {
    out.push_str(keyword);
    out.push(' ');
    write_string(out, value);
}

fn write_date_term(out: &mut String, keyword: &str, date: NaiveDate) {
    out.push_str(keyword);
    out.push(' ');
    out.push_str(&format_date(date));
}

/// Formats a date as `d-MMM-yyyy` with an English month name.
fn format_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Writes a search string argument.
///
/// ASCII strings become quoted strings with `"` and `\` escaped; anything
/// else is emitted in literal form.
fn write_string(out: &mut String, s: &str) {
    if s.is_ascii() {
        out.push('"');
        for c in s.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push('{');
        out.push_str(&s.len().to_string());
        out.push_str("}\r\n");
        out.push_str(s);
    }
}

fn parse_positive(token: &str) -> Result<u32> {
    let n: u32 = token.parse().map_err(|_| {
        Error::Validation(format!(
            "uid/seqno must be an integer, \"*\", or a range: {token}"
        ))
    })?;
    if n == 0 {
        return Err(Error::Validation(
            "uid/seqno must be greater than zero".to_string(),
        ));
    }
    Ok(n)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn caps_with(names: &[&str]) -> CapabilitySet {
        let mut caps = CapabilitySet::new();
        caps.replace(names.iter().copied());
        caps
    }

    #[test]
    fn simple_terms() {
        let query = SearchQuery::new(vec![SearchTerm::Unseen, SearchTerm::Flagged]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "UNSEEN FLAGGED"
        );
    }

    #[test]
    fn text_terms_are_quoted() {
        let query = SearchQuery::new(vec![SearchTerm::From("alice@example.com".to_string())]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "FROM \"alice@example.com\""
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let query = SearchQuery::new(vec![SearchTerm::Subject("say \"hi\"".to_string())]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "SUBJECT \"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn non_ascii_becomes_literal() {
        let query = SearchQuery::new(vec![SearchTerm::Subject("héllo".to_string())]);
        let compiled = query.compile(&CapabilitySet::new()).unwrap();
        assert_eq!(compiled, "SUBJECT {6}\r\nhéllo");
    }

    #[test]
    fn date_formats_with_month_name() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        let query = SearchQuery::new(vec![SearchTerm::Since(date)]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "SINCE 3-Feb-2024"
        );
    }

    #[test]
    fn or_nests_two_sub_expressions() {
        let query = SearchQuery::new(vec![SearchTerm::Or(
            Box::new(SearchQuery::new(vec![SearchTerm::Unseen])),
            Box::new(SearchQuery::new(vec![SearchTerm::Flagged])),
        )]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "OR (UNSEEN) (FLAGGED)"
        );
    }

    #[test]
    fn not_prefixes_the_term() {
        let query = SearchQuery::new(vec![SearchTerm::Not(Box::new(SearchTerm::Deleted))]);
        assert_eq!(query.compile(&CapabilitySet::new()).unwrap(), "NOT DELETED");
    }

    #[test]
    fn uid_set_renders() {
        let set = SeqSet::parse("1,3:5,7:*").unwrap();
        let query = SearchQuery::new(vec![SearchTerm::Uid(set)]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "UID 1,3:5,7:*"
        );
    }

    #[test]
    fn star_collapses_the_set() {
        let set = SeqSet::parse("5,*,9").unwrap();
        assert_eq!(set.to_string(), "*");
    }

    #[test]
    fn zero_uid_is_rejected() {
        assert!(matches!(SeqSet::parse("0"), Err(Error::Validation(_))));
        assert!(matches!(SeqSet::parse("1,0:5"), Err(Error::Validation(_))));
    }

    #[test]
    fn non_numeric_uid_is_rejected() {
        assert!(matches!(SeqSet::parse("abc"), Err(Error::Validation(_))));
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(SeqSet::new(vec![]), Err(Error::Validation(_))));
    }

    #[test]
    fn gmail_terms_require_capability() {
        let query = SearchQuery::new(vec![SearchTerm::GmRaw("has:attachment".to_string())]);
        assert!(matches!(
            query.compile(&CapabilitySet::new()),
            Err(Error::Validation(_))
        ));

        let caps = caps_with(&["X-GM-EXT-1"]);
        assert_eq!(
            query.compile(&caps).unwrap(),
            "X-GM-RAW \"has:attachment\""
        );
    }

    #[test]
    fn modseq_requires_condstore() {
        let query = SearchQuery::new(vec![SearchTerm::ModSeq(42)]);
        assert!(query.compile(&CapabilitySet::new()).is_err());
        assert_eq!(
            query.compile(&caps_with(&["CONDSTORE"])).unwrap(),
            "MODSEQ 42"
        );
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(SearchQuery::new(vec![]).compile(&CapabilitySet::new()).is_err());
    }

    #[test]
    fn header_quotes_both_arguments() {
        let query = SearchQuery::new(vec![SearchTerm::Header(
            "Message-ID".to_string(),
            "<x@y>".to_string(),
        )]);
        assert_eq!(
            query.compile(&CapabilitySet::new()).unwrap(),
            "HEADER \"Message-ID\" \"<x@y>\""
        );
    }
}
