//! Shell-escape helpers (C2).
//!
//! Structured the way a classic shell-escape module is structured (a
//! whitelist predicate plus a `Cow`-returning escape function), but using
//! this crate's own quoting rule: double-quote the argument and
//! backslash-escape `\`, `"`, and `$`, rather than the single-quote rule a
//! generic shell-escape crate would use. This is the rule the wire
//! protocol depends on: the remote `sh` must recover the original bytes
//! exactly when it evaluates `echo <shell_escape(s)>`.

use std::borrow::Cow;

fn whitelisted(byte: u8) -> bool {
    matches!(
        byte,
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9'
            | b'-' | b'+' | b'=' | b'/' | b':' | b'.' | b',' | b'%' | b'_'
    )
}

fn needs_quoting(bytes: &[u8]) -> bool {
    bytes.is_empty() || !bytes.iter().copied().all(whitelisted)
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Escape `s` for safe inclusion as a single word in a `/bin/sh -c`
/// invocation. Bytes outside `[A-Za-z0-9\-+=/:.,%_]`, or the empty string,
/// trigger double-quoting with `\`, `"`, `$` backslash-escaped inside.
/// Anything already within the whitelist is passed through unchanged.
pub fn shell_escape(s: &str) -> Cow<'_, str> {
    if needs_quoting(s.as_bytes()) {
        Cow::Owned(quote(s))
    } else {
        Cow::Borrowed(s)
    }
}

/// Escape `s` for use as a queue pathname. Identical to [`shell_escape`],
/// except that a `~/` prefix is preserved literally (so the remote shell
/// still expands it to the user's home directory); only the remainder is
/// escaped.
pub fn escape_queue(s: &str) -> Cow<'_, str> {
    match s.strip_prefix("~/") {
        Some(rest) => Cow::Owned(format!("~/{}", shell_escape(rest))),
        None => shell_escape(s),
    }
}

/// Escape a byte slice, decoding it as UTF-8 first (lossily: shell
/// arguments such as job directory names are expected to be valid UTF-8,
/// and invalid bytes are replaced rather than rejected).
pub fn shell_escape_bytes(s: &[u8]) -> String {
    shell_escape(&String::from_utf8_lossy(s)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_text() {
        assert_eq!(shell_escape("test"), "test");
    }

    #[test]
    fn quotes_spaces() {
        assert_eq!(shell_escape("hello world"), "\"hello world\"");
    }

    #[test]
    fn escapes_embedded_quote() {
        assert_eq!(shell_escape("some\"thing"), "\"some\\\"thing\"");
    }

    #[test]
    fn escapes_dollar_and_backslash() {
        assert_eq!(shell_escape("$HOME"), "\"\\$HOME\"");
        assert_eq!(shell_escape("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn quotes_empty_string() {
        assert_eq!(shell_escape(""), "\"\"");
    }

    #[test]
    fn passes_through_whitelisted_punctuation() {
        assert_eq!(
            shell_escape("job_1.2,3:4%5=6+7-8/9"),
            "job_1.2,3:4%5=6+7-8/9"
        );
    }

    #[test]
    fn escape_queue_preserves_tilde_prefix() {
        assert_eq!(escape_queue("~/.tej"), "~/.tej");
        assert_eq!(escape_queue("~/my queue"), "~/\"my queue\"");
    }

    #[test]
    fn escape_queue_without_tilde_matches_shell_escape() {
        for s in ["a/b/c", "has space", ""] {
            assert_eq!(escape_queue(s), shell_escape(s));
        }
    }
}
