//! Modified UTF-7 mailbox-name codec (RFC 3501 §5.1.3).
//!
//! Mailbox names travel over the wire in IMAP's "modified UTF-7": printable
//! ASCII passes through, `&` is escaped as `&-`, and everything else is
//! carried as modified base64 (`,` instead of `/`, no padding) over UTF-16BE
//! code units between `&` and `-`.
//!
//! Decoding is permissive: malformed encoded sections pass through verbatim
//! instead of failing, since names ultimately round-trip back out encoded.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::NO_PAD;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Modified base64 for IMAP mailbox names.
const MUTF7: GeneralPurpose = GeneralPurpose::new(
    &alphabet::IMAP_MUTF7,
    NO_PAD.with_decode_allow_trailing_bits(true),
);

/// Bytes escaped in the percent-encoded wire form of a mailbox name.
const ESCAPED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Encodes a mailbox name into modified UTF-7.
#[must_use]
pub fn encode(name: &str) -> String {
    let mut out = String::new();
    let mut pending: Vec<u16> = Vec::new();

    for c in name.chars() {
        if c == '&' {
            flush_encoded(&mut out, &mut pending);
            out.push_str("&-");
        } else if (' '..='~').contains(&c) {
            flush_encoded(&mut out, &mut pending);
            out.push(c);
        } else {
            let mut buf = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush_encoded(&mut out, &mut pending);
    out
}

fn flush_encoded(out: &mut String, pending: &mut Vec<u16>) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.drain(..).flat_map(u16::to_be_bytes).collect();
    out.push('&');
    out.push_str(&MUTF7.encode(bytes));
    out.push('-');
}

/// Decodes a modified UTF-7 mailbox name back to Unicode.
///
/// Malformed encoded sections are passed through unchanged.
#[must_use]
pub fn decode(name: &str) -> String {
    let mut out = String::new();
    let mut rest = name;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('-') {
            out.push('&');
            rest = stripped;
            continue;
        }

        match after.find('-') {
            Some(end) => {
                let chunk = &after[..end];
                match MUTF7.decode(chunk) {
                    Ok(bytes) => {
                        let units: Vec<u16> = bytes
                            .chunks(2)
                            .filter(|pair| pair.len() == 2)
                            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                            .collect();
                        out.push_str(&String::from_utf16_lossy(&units));
                    }
                    Err(_) => {
                        out.push('&');
                        out.push_str(chunk);
                        out.push('-');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Percent-escapes text for the quoted wire form.
pub(crate) fn percent_escape(text: &str) -> String {
    utf8_percent_encode(text, ESCAPED).to_string()
}

/// Produces the wire form of a mailbox name: modified UTF-7, then
/// percent-escaped.
#[must_use]
pub fn encode_mailbox_name(name: &str) -> String {
    percent_escape(&encode(name))
}
