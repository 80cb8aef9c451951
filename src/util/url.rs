//! URL escaping for links handed to bus clients.

use std::fmt::Write;

/// Escape the characters that may not appear raw in a URL.
///
/// Spaces, control characters, non-ASCII characters and `"<>\^`{|}` are
/// written as `%XX` over their UTF-8 bytes. Everything else, including `%`,
/// `/` and `:`, is left alone so that already-escaped segments and the
/// scheme survive unchanged.
#[must_use]
pub fn encode_url(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() && !needs_escape(ch) {
            out.push(ch);
            continue;
        }
        let mut buf = [0u8; 4];
        for byte in ch.encode_utf8(&mut buf).bytes() {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

const fn needs_escape(ch: char) -> bool {
    ch.is_ascii_control()
        || matches!(ch, ' ' | '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}')
}
