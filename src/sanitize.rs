//! Body sanitizer applied before a message is redistributed.
//!
//! Truncates to [`MAX_BODY_CHARS`], strips ANSI escape sequences (CSI, OSC and
//! charset designations), then keeps only printable characters plus newline,
//! tab, carriage return and space.

use std::sync::LazyLock;

use regex::Regex;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Maximum body length in characters
pub const MAX_BODY_CHARS: usize = 2000;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        // CSI: ESC [ params intermediates final
        r"\x1b\[[0-?]*[ -/]*[@-~]",
        // OSC: ESC ] ... terminated by BEL or ST
        r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
        // charset designation: ESC ( X / ESC ) X
        r"|\x1b[()][0-9A-Za-z]",
    ))
    .unwrap()
});

/// Clean an untrusted message body.
///
/// Idempotent and never longer than its input.
pub fn sanitize(text: &str) -> String {
    let truncated = match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    };

    let stripped = ANSI_ESCAPE.replace_all(truncated, "");
    stripped.chars().filter(|&c| is_kept(c)).collect()
}

fn is_kept(c: char) -> bool {
    matches!(c, '\n' | '\t' | '\r' | ' ') || is_printable(c)
}

// Letters, marks, numbers, punctuation and symbols. Separators other than
// ASCII space and every `C*` category (control, format, surrogate, private
// use, unassigned) are dropped.
fn is_printable(c: char) -> bool {
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}
