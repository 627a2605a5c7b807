//! WhatsApp markup normalisation for model output.
//!
//! Models drift back into Markdown on long answers. WhatsApp renders single
//! asterisks as bold, ignores `#` headings and shows `---` literally, so
//! every reply passes through [`sanitize`] before it is stored or sent.

use std::sync::LazyLock;

use regex::Regex;

/// Visible divider used in place of Markdown horizontal rules.
pub const DIVIDER: &str = "━━━━━━";

static DOUBLE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("static regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("static regex"));
static DASH_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^-{3,}$").expect("static regex"));
static UNDERSCORE_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^_{3,}$").expect("static regex"));

/// Rewrite Markdown-isms into WhatsApp markup.
///
/// Idempotent: the rewrite pass repeats until the text stops changing.
/// Every pass that changes anything either removes `*`, `#`, `-`, `_`
/// characters or trims whitespace, so the loop terminates.
pub fn sanitize(text: &str) -> String {
    let mut current = pass(text);
    loop {
        let next = pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn pass(text: &str) -> String {
    let text = DOUBLE_BOLD.replace_all(text, "*$1*");
    let text = HEADING.replace_all(&text, "");
    let text = DASH_RULE.replace_all(&text, DIVIDER);
    let text = UNDERSCORE_RULE.replace_all(&text, DIVIDER);
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_bold_becomes_single() {
        assert_eq!(sanitize("**hello**"), "*hello*");
        assert_eq!(sanitize("Dress: **Pastels** and **Ivory**"), "Dress: *Pastels* and *Ivory*");
    }

    #[test]
    fn bare_heading_marker_line_is_dropped() {
        assert_eq!(sanitize("intro\n##\nTitle"), "intro\nTitle");
    }

    #[test]
    fn bold_does_not_span_lines() {
        assert_eq!(sanitize("**a\nb**"), "**a\nb**");
    }

    #[test]
    fn headings_are_stripped() {
        assert_eq!(sanitize("## Title\n"), "Title");
        assert_eq!(sanitize("# One\ntext\n###### Six"), "One\ntext\nSix");
        assert_eq!(sanitize("####### seven"), "####### seven");
        assert_eq!(sanitize("#hashtag"), "#hashtag");
    }

    #[test]
    fn rules_become_dividers() {
        assert_eq!(sanitize("---"), DIVIDER);
        assert_eq!(sanitize("a\n-----\nb"), format!("a\n{DIVIDER}\nb"));
        assert_eq!(sanitize("a\n___\nb"), format!("a\n{DIVIDER}\nb"));
        assert_eq!(sanitize("--"), "--");
        assert_eq!(sanitize("- item"), "- item");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize("  \n hi there \n\n"), "hi there");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn idempotent_on_tricky_inputs() {
        let inputs = [
            "***a***",
            "  # x",
            "****bold****",
            "**x** ## y\n---\n",
            "\n___\n",
            "#  ## nested",
            "*already* fine",
            "━━━━━━\n**Day 1**\n- Haldi",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn triple_star_collapses() {
        assert_eq!(sanitize("***a***"), "*a*");
    }

    #[test]
    fn indented_heading_is_stripped_after_trim() {
        assert_eq!(sanitize("  # x"), "x");
    }
}
