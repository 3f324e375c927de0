//! Header, body and attachment encoding helpers.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use chrono::{DateTime, FixedOffset};

/// Width of a wrapped base64 line, excluding the CRLF.
pub const BASE64_LINE_WIDTH: usize = 78;

/// Width used for quoted-printable soft line breaks.
pub const QP_LINE_WIDTH: usize = 76;

/// RFC 5322 date, e.g. `Tue, 1 Jul 2003 10:52:37 +0200`.
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    date.to_rfc2822()
}

/// Base64 encodes `data` and wraps it into CRLF-terminated lines of at most
/// `width` characters. Every line, including the last, ends with CRLF.
pub fn encode_base64_lines(data: &[u8], width: usize) -> String {
    let encoded = B64.encode(data);
    let width = width.max(4);
    let mut out = String::with_capacity(encoded.len() + (encoded.len() / width + 1) * 2);
    let mut start = 0;
    while start < encoded.len() {
        let end = (start + width).min(encoded.len());
        // base64 output is ASCII, so byte offsets are char boundaries.
        out.push_str(&encoded[start..end]);
        out.push_str("\r\n");
        start = end;
    }
    out
}

/// Quoted-printable encoding (RFC 2045). Line breaks in the input become CRLF.
pub fn encode_quoted_printable(text: &str, line_length: usize) -> String {
    let bytes = text.as_bytes();
    let mut result = String::new();
    let mut current_line_length = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        let encoded: String = if byte == 0x0a {
            result.push_str("\r\n");
            current_line_length = 0;
            i += 1;
            continue;
        } else if byte == 0x0d {
            if i + 1 < bytes.len() && bytes[i + 1] == 0x0a {
                result.push_str("\r\n");
                current_line_length = 0;
                i += 2;
                continue;
            } else {
                "=0D".to_string()
            }
        } else {
            let is_whitespace = byte == 0x20 || byte == 0x09;
            let next_is_line_break =
                i + 1 >= bytes.len() || bytes[i + 1] == 0x0a || bytes[i + 1] == 0x0d;
            let needs_encoding = (byte < 32 && !is_whitespace)
                || byte > 126
                || byte == b'='
                || (is_whitespace && next_is_line_break);

            if needs_encoding {
                format!("={:02X}", byte)
            } else {
                char::from(byte).to_string()
            }
        };

        if current_line_length + encoded.len() > line_length.saturating_sub(3) {
            result.push_str("=\r\n");
            current_line_length = 0;
        }
        result.push_str(&encoded);
        current_line_length += encoded.len();
        i += 1;
    }

    result
}

/// Length of one encoded-word, delimiters included. RFC 2047 allows 75; this
/// leaves room for `Reply-To: ` in front of a word on a 78 character line.
const ENCODED_WORD_MAX: usize = 66;

/// Header lines are folded to this width where whitespace allows.
pub const HEADER_LINE_WIDTH: usize = 78;

/// Q-encoded bytes of one character.
fn q_encode_char(c: char, out: &mut String) {
    let mut buf = [0u8; 4];
    for byte in c.encode_utf8(&mut buf).bytes() {
        if (33..=126).contains(&byte) && byte != b'?' && byte != b'=' && byte != b'_' {
            out.push(char::from(byte));
        } else if byte == b' ' {
            out.push('_');
        } else {
            out.push_str(&format!("={:02X}", byte));
        }
    }
}

/// `true` when `text` cannot go into a header verbatim: non-ASCII, or a
/// word too long to fold.
fn needs_encoding(text: &str) -> bool {
    !text.is_ascii() || text.split(' ').any(|word| word.len() > HEADER_LINE_WIDTH - 2)
}

/// RFC 2047 header encoding (UTF-8 Q). Text that can be written as is comes
/// back unchanged; anything else becomes space-separated encoded-words of at
/// most 75 characters, never splitting a character.
pub fn encode_header(text: &str) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }
    const PREFIX: &str = "=?UTF-8?Q?";
    const SUFFIX: &str = "?=";
    let room = ENCODED_WORD_MAX - PREFIX.len() - SUFFIX.len();

    let mut words = Vec::new();
    let mut current = String::new();
    let mut piece = String::new();
    for c in text.chars() {
        piece.clear();
        q_encode_char(c, &mut piece);
        if !current.is_empty() && current.len() + piece.len() > room {
            words.push(format!("{}{}{}", PREFIX, current, SUFFIX));
            current.clear();
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        words.push(format!("{}{}{}", PREFIX, current, SUFFIX));
    }
    words.join(" ")
}

/// Display-name phrase: a quoted string for plain ASCII names, encoded-words
/// (which must not be quoted) for everything else.
pub fn quote_display_name(name: &str) -> String {
    if needs_encoding(name) {
        return encode_header(name);
    }
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// MIME parameter `key="value"`, or RFC 2231 `key*=UTF-8''...` for non-ASCII values.
pub fn mime_parameter(key: &str, value: &str) -> String {
    if value.is_ascii() {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("{}=\"{}\"", key, escaped);
    }
    let mut encoded = String::new();
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    format!("{}*=UTF-8''{}", key, encoded)
}

/// Replaces CR and LF with spaces so a value cannot start a new header line.
pub fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// `Name: value` folded at spaces into CRLF-terminated lines of at most
/// `width` characters. Words longer than `width` get a line of their own.
pub fn fold_header(name: &str, value: &str, width: usize) -> String {
    let mut out = String::with_capacity(name.len() + value.len() + 8);
    out.push_str(name);
    out.push(':');
    let mut line_len = name.len() + 1;
    for (i, word) in value.split(' ').enumerate() {
        if i > 0 && !word.is_empty() && line_len + 1 + word.len() > width {
            out.push_str("\r\n");
            line_len = 0;
        }
        out.push(' ');
        out.push_str(word);
        line_len += 1 + word.len();
    }
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_date() {
        let date = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2003, 7, 1, 10, 52, 37)
            .unwrap();
        assert_eq!(format_date(&date), "Tue, 1 Jul 2003 10:52:37 +0200");
    }

    #[test]
    fn test_base64_lines_wrap_at_width() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let wrapped = encode_base64_lines(&data, BASE64_LINE_WIDTH);
        let lines: Vec<&str> = wrapped.split_terminator("\r\n").collect();
        assert!(wrapped.ends_with("\r\n"));
        for line in &lines[..lines.len() - 1] {
            assert_eq!(line.len(), BASE64_LINE_WIDTH);
        }
        assert!(lines.last().unwrap().len() <= BASE64_LINE_WIDTH);

        let joined: String = lines.concat();
        assert_eq!(B64.decode(joined).unwrap(), data);
    }

    #[test]
    fn test_base64_lines_empty_input() {
        assert_eq!(encode_base64_lines(&[], BASE64_LINE_WIDTH), "");
    }

    #[test]
    fn test_quoted_printable() {
        assert_eq!(encode_quoted_printable("a=b", QP_LINE_WIDTH), "a=3Db");
        assert_eq!(encode_quoted_printable("line1\nline2", QP_LINE_WIDTH), "line1\r\nline2");
        assert_eq!(encode_quoted_printable("trailing \n", QP_LINE_WIDTH), "trailing=20\r\n");
        assert_eq!(encode_quoted_printable("é", QP_LINE_WIDTH), "=C3=A9");

        let long = "x".repeat(100);
        let encoded = encode_quoted_printable(&long, QP_LINE_WIDTH);
        assert!(encoded.split("\r\n").all(|l| l.len() <= QP_LINE_WIDTH));
        assert_eq!(encoded.replace("=\r\n", ""), long);
    }

    #[test]
    fn test_encode_header() {
        assert_eq!(encode_header("Hello"), "Hello");
        assert_eq!(encode_header("Olá mundo"), "=?UTF-8?Q?Ol=C3=A1_mundo?=");
    }

    #[test]
    fn test_encode_header_splits_long_text() {
        let text = "é".repeat(400);
        let encoded = encode_header(&text);
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        let mut decoded = Vec::new();
        for word in words {
            assert!(word.len() <= 75, "{}", word);
            let inner = word.strip_prefix("=?UTF-8?Q?").unwrap().strip_suffix("?=").unwrap();
            // each word holds whole characters only
            assert_eq!(inner.len() % 6, 0);
            for hex in inner.split('=').skip(1) {
                decoded.push(u8::from_str_radix(hex, 16).unwrap());
            }
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn test_encode_header_unbreakable_ascii_word() {
        let word = "x".repeat(200);
        let encoded = encode_header(&word);
        assert!(encoded.starts_with("=?UTF-8?Q?"));
        assert!(encoded.split(' ').all(|w| w.len() <= 75));
    }

    #[test]
    fn test_quote_display_name() {
        assert_eq!(quote_display_name("A B"), "\"A B\"");
        assert_eq!(quote_display_name("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_display_name("José"), "=?UTF-8?Q?Jos=C3=A9?=");
    }

    #[test]
    fn test_mime_parameter() {
        assert_eq!(mime_parameter("filename", "a.txt"), "filename=\"a.txt\"");
        assert_eq!(mime_parameter("filename", "a\"b.txt"), "filename=\"a\\\"b.txt\"");
        assert_eq!(mime_parameter("filename", "ré sumé.pdf"), "filename*=UTF-8''r%C3%A9%20sum%C3%A9.pdf");
    }

    #[test]
    fn test_strip_line_breaks() {
        assert_eq!(strip_line_breaks("Hi\r\nBcc: x"), "Hi  Bcc: x");
    }

    #[test]
    fn test_fold_header() {
        assert_eq!(fold_header("Subject", "short", HEADER_LINE_WIDTH), "Subject: short\r\n");

        let value = vec!["word"; 60].join(" ");
        let folded = fold_header("Subject", &value, HEADER_LINE_WIDTH);
        assert!(folded.ends_with("\r\n"));
        for line in folded.split_terminator("\r\n") {
            assert!(line.len() <= HEADER_LINE_WIDTH, "{}", line);
        }
        // unfolding gives the original value back
        let unfolded = folded.trim_end_matches("\r\n").replace("\r\n", "");
        assert_eq!(unfolded, format!("Subject: {}", value));
    }
}
