//! Post-processing: deterministic clean-up of remote-model output.
//!
//! Two consumers:
//!
//! - [`strip_code_fences`] runs on the structured-extraction answer before
//!   JSON parsing. Models wrap JSON in ` ```json … ``` ` despite being told
//!   not to.
//! - [`clean_transcription`] runs on passport transcriptions before they are
//!   used as acquired text.
//!
//! Each rule is a pure `&str → String` function and is tested on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a verbatim transcription returned by the multimodal model.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim leading/trailing blank space
pub fn clean_transcription(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*(?:\r?\n|$)").unwrap());
static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\r?\n)?```\s*$").unwrap());

/// Remove a leading ` ``` ` / ` ```json ` marker and a trailing ` ``` `.
///
/// The two ends are stripped independently, so a truncated answer that only
/// has the opening fence is still unwrapped. The result is trimmed.
pub fn strip_code_fences(input: &str) -> String {
    let s = input.trim();
    let s = match RE_OPENING_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match RE_CLOSING_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim().to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences() {
        let input = "```json\n{\"passport\": null}\n```";
        assert_eq!(strip_code_fences(input), "{\"passport\": null}");
    }

    #[test]
    fn test_strip_bare_fences() {
        let input = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_unterminated_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1"), "{\"a\": 1");
    }

    #[test]
    fn test_unfenced_passthrough() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_inner_backticks_kept() {
        let input = "```json\n{\"note\": \"use ```x``` here\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"note\": \"use ```x``` here\"}");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("P<\u{200B}USA\u{FEFF}"), "P<USA");
    }

    #[test]
    fn test_clean_transcription_full_pipeline() {
        let input = "```\r\nPASSPORT   \r\n\r\n\r\n\r\n\r\nSURNAME\u{00AD}: DOE\r\n```";
        assert_eq!(clean_transcription(input), "PASSPORT\n\n\nSURNAME: DOE");
    }
}
