//! Pure line classifiers for the three IMAP response shapes.
//!
//! Every function here is a pure function over a string slice; there is no
//! shared parse state. A sub-pattern that fails to match leaves its field
//! empty instead of failing the line.

use crate::types::{SeqNum, Status, Uid};

use super::{Continuation, SearchResult, TaggedResponse, UntaggedResponse, WireEvent};

/// Outcome of classifying one complete line.
pub(crate) enum ParsedLine {
    /// The line decoded to a wire event.
    Event(WireEvent),
    /// The line ends in a `{n}` marker: switch into literal accumulation.
    LiteralStart {
        /// UID extracted from the FETCH argument fragment, if present.
        uid: Option<Uid>,
        /// Declared literal length in bytes.
        size: usize,
    },
}

/// Classifies a complete line (CRLF already stripped).
pub(crate) fn parse_line(line: &str) -> ParsedLine {
    if let Some(rest) = line.strip_prefix("* ") {
        if let Some(size) = literal_trailer(line) {
            return ParsedLine::LiteralStart {
                uid: extract_fetch_uid(rest),
                size,
            };
        }
        return ParsedLine::Event(WireEvent::Untagged(decode_untagged(rest)));
    }

    if line.starts_with('+') {
        return ParsedLine::Event(WireEvent::Continuation(parse_continuation(line)));
    }

    if line.starts_with('A') {
        if let Some(tagged) = parse_tagged(line) {
            return ParsedLine::Event(WireEvent::Tagged(tagged));
        }
    }

    tracing::debug!(line, "unrecognized response line");
    ParsedLine::Event(WireEvent::Other(line.to_string()))
}

/// Parses `A<tag> (OK|NO|BAD) [<code>] <text>`.
fn parse_tagged(line: &str) -> Option<TaggedResponse> {
    let rest = line.strip_prefix('A')?;
    let sp = rest.find(' ')?;
    let tag: u32 = rest[..sp].parse().ok()?;
    let rest = &rest[sp + 1..];

    let (word, after) = split_word(rest);
    let status = Status::parse(word)?;
    let (code, text) = split_code_text(after);

    Some(TaggedResponse {
        tag,
        status,
        code,
        text,
    })
}

/// Parses `+[ [<code>]] <text>`.
fn parse_continuation(line: &str) -> Continuation {
    let rest = &line[1..];
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let (code, text) = split_code_text(rest);
    Continuation { code, text }
}

/// Decodes the body of an untagged line (after `* `).
fn decode_untagged(rest: &str) -> UntaggedResponse {
    let (first, after) = split_word(rest);

    if let Ok(num) = first.parse::<u32>() {
        let (word, args) = split_word(after);
        let keyword = word.to_uppercase();
        return match keyword.as_str() {
            "EXISTS" => UntaggedResponse::Exists(num),
            "RECENT" => UntaggedResponse::Recent(num),
            "EXPUNGE" => SeqNum::new(num).map_or_else(
                || UntaggedResponse::Unknown {
                    keyword,
                    raw: rest.to_string(),
                },
                UntaggedResponse::Expunge,
            ),
            "FETCH" => SeqNum::new(num).map_or_else(
                || UntaggedResponse::Unknown {
                    keyword: "FETCH".to_string(),
                    raw: rest.to_string(),
                },
                |seq| UntaggedResponse::Fetch {
                    seq,
                    raw: args.to_string(),
                },
            ),
            _ => UntaggedResponse::Unknown {
                keyword,
                raw: rest.to_string(),
            },
        };
    }

    let keyword = first.to_uppercase();
    match keyword.as_str() {
        "OK" | "NO" | "BAD" | "BYE" => {
            let (code, text) = split_code_text(after);
            match keyword.as_str() {
                "OK" => UntaggedResponse::Ok { code, text },
                "NO" => UntaggedResponse::No { code, text },
                "BAD" => UntaggedResponse::Bad { code, text },
                _ => UntaggedResponse::Bye { code, text },
            }
        }
        "CAPABILITY" => UntaggedResponse::Capability(
            after.split_whitespace().map(str::to_string).collect(),
        ),
        "FLAGS" => UntaggedResponse::Flags(parse_list(after)),
        "SEARCH" => UntaggedResponse::Search(parse_search(after)),
        "SORT" => UntaggedResponse::Sort(parse_numbers(after)),
        _ => UntaggedResponse::Unknown {
            keyword,
            raw: after.to_string(),
        },
    }
}

/// Splits off the first space-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

/// Splits an optional leading `[<code>]` from the free text that follows.
fn split_code_text(s: &str) -> (Option<String>, String) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let code = rest[..end].to_string();
            let text = rest[end + 1..].trim_start().to_string();
            return (Some(code), text);
        }
    }
    (None, s.to_string())
}

/// Splits a space-separated or parenthesized list into tokens.
fn parse_list(s: &str) -> Vec<String> {
    let inner = s
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(s);
    inner.split_whitespace().map(str::to_string).collect()
}

/// Parses space-separated integers, skipping anything unparseable.
fn parse_numbers(s: &str) -> Vec<u32> {
    s.split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect()
}

/// Parses a SEARCH payload, including the CONDSTORE `(MODSEQ <n>)` suffix.
fn parse_search(s: &str) -> SearchResult {
    let s = s.trim();
    if let Some(without_close) = s.strip_suffix(')') {
        if let Some(open) = without_close.rfind('(') {
            let group = &without_close[open + 1..];
            let (word, value) = split_word(group);
            if word.eq_ignore_ascii_case("MODSEQ") {
                if let Ok(modseq) = value.trim().parse::<u64>() {
                    return SearchResult {
                        ids: parse_numbers(&without_close[..open]),
                        modseq: Some(modseq),
                    };
                }
            }
        }
    }
    SearchResult {
        ids: parse_numbers(s),
        modseq: None,
    }
}

/// Extracts the literal byte count from a trailing `{n}` marker.
fn literal_trailer(line: &str) -> Option<usize> {
    let line = line.strip_suffix('}')?;
    let open = line.rfind('{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Pulls the UID out of a `<seq> FETCH (... UID <n> ...)` fragment.
fn extract_fetch_uid(rest: &str) -> Option<Uid> {
    let mut parts = rest.splitn(3, ' ');
    parts.next()?.parse::<u32>().ok()?;
    if !parts.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }
    let args = parts.next()?;

    let trim = |t: &str| {
        t.trim_matches(|c| c == '(' || c == ')')
            .to_string()
    };
    let mut tokens = args.split_whitespace();
    while let Some(token) = tokens.next() {
        if trim(token).eq_ignore_ascii_case("UID") {
            if let Some(n) = tokens.next().and_then(|v| trim(v).parse::<u32>().ok()) {
                return Uid::new(n);
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(line: &str) -> WireEvent {
        match parse_line(line) {
            ParsedLine::Event(ev) => ev,
            ParsedLine::LiteralStart { .. } => panic!("expected event for {line}"),
        }
    }

    #[test]
    fn tagged_ok() {
        let WireEvent::Tagged(t) = event("A1 OK LOGIN completed") else {
            panic!("expected tagged");
        };
        assert_eq!(t.tag, 1);
        assert_eq!(t.status, Status::Ok);
        assert!(t.code.is_none());
        assert_eq!(t.text, "LOGIN completed");
    }

    #[test]
    fn tagged_with_code() {
        let WireEvent::Tagged(t) = event("A23 NO [ALREADYEXISTS] duplicate") else {
            panic!("expected tagged");
        };
        assert_eq!(t.tag, 23);
        assert_eq!(t.status, Status::No);
        assert_eq!(t.code.as_deref(), Some("ALREADYEXISTS"));
        assert_eq!(t.text, "duplicate");
    }

    #[test]
    fn tagged_bad_tag_is_other() {
        assert!(matches!(event("A1x OK fine"), WireEvent::Other(_)));
    }

    #[test]
    fn untagged_ok_with_code() {
        let WireEvent::Untagged(UntaggedResponse::Ok { code, text }) =
            event("* OK [UIDVALIDITY 42] valid")
        else {
            panic!("expected untagged OK");
        };
        assert_eq!(code.as_deref(), Some("UIDVALIDITY 42"));
        assert_eq!(text, "valid");
    }

    #[test]
    fn untagged_exists() {
        assert_eq!(
            event("* 23 EXISTS"),
            WireEvent::Untagged(UntaggedResponse::Exists(23))
        );
    }

    #[test]
    fn untagged_expunge() {
        let WireEvent::Untagged(UntaggedResponse::Expunge(seq)) = event("* 4 EXPUNGE") else {
            panic!("expected expunge");
        };
        assert_eq!(seq.get(), 4);
    }

    #[test]
    fn untagged_capability() {
        let WireEvent::Untagged(UntaggedResponse::Capability(caps)) =
            event("* CAPABILITY IMAP4rev1 STARTTLS IDLE")
        else {
            panic!("expected capability");
        };
        assert_eq!(caps, vec!["IMAP4rev1", "STARTTLS", "IDLE"]);
    }

    #[test]
    fn untagged_flags_parenthesized() {
        let WireEvent::Untagged(UntaggedResponse::Flags(flags)) =
            event("* FLAGS (\\Seen \\Deleted)")
        else {
            panic!("expected flags");
        };
        assert_eq!(flags, vec!["\\Seen", "\\Deleted"]);
    }

    #[test]
    fn untagged_search_numbers() {
        let WireEvent::Untagged(UntaggedResponse::Search(result)) = event("* SEARCH 10 11 12")
        else {
            panic!("expected search");
        };
        assert_eq!(result.ids, vec![10, 11, 12]);
        assert!(result.modseq.is_none());
    }

    #[test]
    fn untagged_search_empty() {
        let WireEvent::Untagged(UntaggedResponse::Search(result)) = event("* SEARCH") else {
            panic!("expected search");
        };
        assert!(result.ids.is_empty());
    }

    #[test]
    fn untagged_search_condstore() {
        let WireEvent::Untagged(UntaggedResponse::Search(result)) =
            event("* SEARCH 7 9 (MODSEQ 917162500)")
        else {
            panic!("expected search");
        };
        assert_eq!(result.ids, vec![7, 9]);
        assert_eq!(result.modseq, Some(917_162_500));
    }

    #[test]
    fn untagged_sort() {
        let WireEvent::Untagged(UntaggedResponse::Sort(ids)) = event("* SORT 3 1 2") else {
            panic!("expected sort");
        };
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn unknown_keyword_passes_raw() {
        let WireEvent::Untagged(UntaggedResponse::Unknown { keyword, raw }) =
            event("* STATUS \"INBOX\" (MESSAGES 231)")
        else {
            panic!("expected unknown");
        };
        assert_eq!(keyword, "STATUS");
        assert_eq!(raw, "\"INBOX\" (MESSAGES 231)");
    }

    #[test]
    fn continuation_plain() {
        let WireEvent::Continuation(c) = event("+ idling") else {
            panic!("expected continuation");
        };
        assert!(c.code.is_none());
        assert_eq!(c.text, "idling");
    }

    #[test]
    fn continuation_bare_plus() {
        let WireEvent::Continuation(c) = event("+") else {
            panic!("expected continuation");
        };
        assert!(c.text.is_empty());
    }

    #[test]
    fn literal_start_with_uid() {
        let ParsedLine::LiteralStart { uid, size } =
            parse_line("* 3 FETCH (UID 7 BODY[] {11})")
        else {
            panic!("expected literal start");
        };
        assert_eq!(uid.unwrap().get(), 7);
        assert_eq!(size, 11);
    }

    #[test]
    fn literal_start_without_uid() {
        let ParsedLine::LiteralStart { uid, size } = parse_line("* 3 FETCH (BODY[] {42})")
        else {
            panic!("expected literal start");
        };
        assert!(uid.is_none());
        assert_eq!(size, 42);
    }

    #[test]
    fn non_numeric_literal_is_not_a_literal() {
        assert!(matches!(
            parse_line("* OK braces {abc}"),
            ParsedLine::Event(WireEvent::Untagged(UntaggedResponse::Ok { .. }))
        ));
    }

    #[test]
    fn garbage_line_is_other() {
        assert!(matches!(event("garbage"), WireEvent::Other(_)));
    }
}
