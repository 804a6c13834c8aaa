//! Post-processing of model output and document metadata

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn thinking_block() -> &'static Regex {
    static THINKING: OnceLock<Regex> = OnceLock::new();
    THINKING.get_or_init(|| {
        Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>").expect("valid thinking-block regex")
    })
}

/// Removes reasoning blocks and a fence wrapping the whole reply
pub fn clean_model_output(output: &str) -> String {
    let without_thinking = thinking_block().replace_all(output, "");
    let trimmed = without_thinking.trim();

    const FENCE_OPENERS: &[&str] = &["```markdown\n", "```md\n", "```text\n", "```\n"];
    const FENCE: &str = "```";

    for opener in FENCE_OPENERS {
        if trimmed.len() >= opener.len() + FENCE.len()
            && trimmed.starts_with(opener)
            && trimmed.ends_with(FENCE)
        {
            return trimmed[opener.len()..trimmed.len() - FENCE.len()]
                .trim()
                .to_string();
        }
    }

    trimmed.to_string()
}

/// Display title for a document: its file name without extension
pub fn document_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

/// Longest prefix of `text` with at most `max_chars` chars
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "  A summary.  ", "A summary." },
        think = { "<think>hmm, let me see</think>\nThe answer.", "The answer." },
        thinking_multiline = { "<thinking>\nstep 1\nstep 2\n</thinking>Result", "Result" },
        markdown_fence = { "```markdown\n# Notes\n- a\n```", "# Notes\n- a" },
        bare_fence = { "```\ntext\n```", "text" },
        inner_fence_kept = { "Intro\n```\ncode\n```", "Intro\n```\ncode\n```" },
    )]
    fn test_clean_model_output(input: &str, expected: &str) {
        assert_eq!(clean_model_output(input), expected);
    }

    #[test]
    fn test_document_title() {
        assert_eq!(document_title(Path::new("/tmp/Quarterly Report.md")), "Quarterly Report");
        assert_eq!(document_title(Path::new("notes")), "notes");
        assert_eq!(document_title(Path::new("/")), "Untitled");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
