//! ANSI escape-sequence stripping (testable property §8.4), grounded on
//! `original_source/src/kagan/ansi/cleaner.py`.

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:\[[0-?]*[ -/]*[@-~]|\][^\x07]*\x07|[@-Z\\^_])").expect("valid ANSI regex")
});

/// Remove all ANSI escape sequences (CSI, OSC, and single-char escapes) from `text`.
pub fn strip_ansi(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let input = "\x1b[31mred\x1b[0m text";
        assert_eq!(strip_ansi(input), "red text");
    }

    #[test]
    fn idempotent() {
        let input = "\x1b[1;32mgreen\x1b[0m plain";
        let once = strip_ansi(input);
        let twice = strip_ansi(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn never_lengthens() {
        let input = "\x1b[2J\x1b[H hello \x1b]0;title\x07world";
        assert!(strip_ansi(input).len() <= input.len());
    }

    #[test]
    fn plain_text_is_preserved_under_concatenation() {
        let a = "hello ";
        let b = "world";
        assert_eq!(strip_ansi(a) + &strip_ansi(b), strip_ansi(&(a.to_string() + b)));
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert_eq!(strip_ansi(""), "");
    }
}
