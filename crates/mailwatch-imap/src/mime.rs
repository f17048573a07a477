//! MIME decoding collaborator seam.
//!
//! The engine does not decode MIME itself. Each completed body literal is
//! handed to a [`MailDecoder`] exactly once, and whatever comes back — a
//! decoded message or an error string — is surfaced to the application as a
//! mail notification. Plug in a full MIME library behind this trait; the
//! bundled [`BasicDecoder`] only splits headers from the body.

/// A decoded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMail {
    /// Unfolded `(name, value)` header pairs in order of appearance.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes after the blank line.
    pub body: Vec<u8>,
}

impl DecodedMail {
    /// Returns the first header with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Decodes raw message bytes fetched from the server.
///
/// Invoked once per completed body literal. Errors are forwarded in the mail
/// notification; they never tear down the connection.
pub trait MailDecoder: Send {
    /// Decodes one raw message.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the bytes cannot be decoded.
    fn decode(&self, raw: &[u8]) -> Result<DecodedMail, String>;
}

/// Minimal decoder: splits headers from the body at the first blank line and
/// unfolds continuation lines. No transfer-encoding or multipart handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicDecoder;

impl MailDecoder for BasicDecoder {
    fn decode(&self, raw: &[u8]) -> Result<DecodedMail, String> {
        let (header_bytes, body) = split_at_blank_line(raw);
        let header_text = String::from_utf8_lossy(header_bytes);

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in header_text.split("\r\n").flat_map(|l| l.split('\n')) {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded continuation of the previous header.
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim_start());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(DecodedMail {
            headers,
            body: body.to_vec(),
        })
    }
}

/// Splits raw message bytes at the first blank line.
fn split_at_blank_line(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        return (&raw[..pos], &raw[pos + 4..]);
    }
    if let Some(pos) = raw.windows(2).position(|w| w == b"\n\n") {
        return (&raw[..pos], &raw[pos + 2..]);
    }
    (raw, &[])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn splits_headers_and_body() {
        let raw = b"Subject: hello\r\nFrom: a@b.c\r\n\r\nthe body\r\n";
        let mail = BasicDecoder.decode(raw).unwrap();
        assert_eq!(mail.header("subject"), Some("hello"));
        assert_eq!(mail.header("From"), Some("a@b.c"));
        assert_eq!(mail.body, b"the body\r\n");
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = b"Subject: a very\r\n long subject\r\n\r\n";
        let mail = BasicDecoder.decode(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("a very long subject"));
    }

    #[test]
    fn headers_only_message() {
        let raw = b"Subject: no body";
        let mail = BasicDecoder.decode(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("no body"));
        assert!(mail.body.is_empty());
    }

    #[test]
    fn lf_only_line_endings() {
        let raw = b"Subject: unix\n\nbody";
        let mail = BasicDecoder.decode(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("unix"));
        assert_eq!(mail.body, b"body");
    }
}
