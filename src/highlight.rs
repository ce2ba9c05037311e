//! ANSI syntax highlighting for Python source shown in reports.
//!
//! Purely cosmetic: independent substitution passes over the text. The code
//! that is executed or written to spill files is never the decorated form.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const RESET: &str = "\x1b[0m";
const BLUE: &str = "\x1b[34m"; // keywords
const GREEN: &str = "\x1b[32m"; // strings
const CYAN: &str = "\x1b[36m"; // numbers
const YELLOW: &str = "\x1b[33m"; // comments

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(import|from|as|def|class|if|elif|else|for|while|return|yield|with|try|except|finally|raise|assert|break|continue|pass|lambda|global|nonlocal|True|False|None|and|or|not|in|is)\b",
        )
        .expect("keyword regex")
    })
}

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#).expect("string regex")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The trailing \b keeps digits inside earlier ANSI escapes (e.g. "[34m")
    // from matching: they are always followed by a word character.
    RE.get_or_init(|| Regex::new(r"\b\d+\.?\d*\b").expect("number regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)#.*$").expect("comment regex"))
}

/// Decorate Python source with ANSI colors for keywords, string and number
/// literals, and comments.
pub fn highlight_python(code: &str) -> String {
    let paint = |color: &'static str| {
        move |caps: &Captures| format!("{color}{}{RESET}", &caps[0])
    };
    let code = keyword_re().replace_all(code, paint(BLUE));
    let code = string_re().replace_all(&code, paint(GREEN));
    let code = number_re().replace_all(&code, paint(CYAN));
    let code = comment_re().replace_all(&code, paint(YELLOW));
    code.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_colored() {
        let decorated = highlight_python("import math");
        assert!(
            decorated.contains("\x1b[34mimport\x1b[0m"),
            "got: {decorated:?}"
        );
        assert!(decorated.contains("math"));
    }

    #[test]
    fn string_literals_are_colored() {
        let decorated = highlight_python("x = 'hi'");
        assert!(
            decorated.contains("\x1b[32m'hi'\x1b[0m"),
            "got: {decorated:?}"
        );
    }

    #[test]
    fn numbers_are_colored() {
        let decorated = highlight_python("x = 42");
        assert!(
            decorated.contains("\x1b[36m42\x1b[0m"),
            "got: {decorated:?}"
        );
    }

    #[test]
    fn comments_are_colored() {
        let decorated = highlight_python("x = y  # note");
        assert!(
            decorated.contains("\x1b[33m# note\x1b[0m"),
            "got: {decorated:?}"
        );
    }

    #[test]
    fn plain_identifiers_pass_through() {
        assert_eq!(highlight_python("foo"), "foo");
    }

    #[test]
    fn digits_in_earlier_escapes_are_not_rewrapped() {
        // The keyword pass inserts "\x1b[34m...\x1b[0m"; the number pass must
        // leave those escape sequences alone.
        let decorated = highlight_python("if x:\n    pass");
        assert!(
            !decorated.contains("\x1b[36m34\x1b[0m"),
            "number pass corrupted an escape: {decorated:?}"
        );
    }
}
