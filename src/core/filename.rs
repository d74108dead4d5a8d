use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const FORBIDDEN: &[(char, char)] = &[
    ('<', '＜'),
    ('>', '＞'),
    (':', '꞉'),
    ('"', '＂'),
    ('/', '⧸'),
    ('\\', '＼'),
    ('|', '｜'),
    ('?', '？'),
    ('*', '＊'),
];

/// Makes `name` safe as a single path component on every desktop OS.
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_path_component(name: &str) -> String {
    let name: String = name
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .nfc()
        .collect();
    let name = name.replace(" | ", "｜");

    let name: String = name
        .chars()
        .map(|c| {
            FORBIDDEN
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect();

    let name = WS_RE.replace_all(&name, " ");
    name.trim_start()
        .trim_end_matches([' ', '-', '.', ';'])
        .to_string()
}

pub fn contains_forbidden(name: &str) -> bool {
    name.chars().any(|c| FORBIDDEN.iter().any(|(from, _)| *from == c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_basic_forbidden_chars() {
        assert_eq!(sanitize_path_component("a:b?c"), "a꞉b？c");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_path_component("hello   world"), "hello world");
        assert_eq!(sanitize_path_component("tab\there\nnewline"), "tab here newline");
    }

    #[test]
    fn sanitize_trims_trailing_punctuation() {
        assert_eq!(sanitize_path_component("file name - "), "file name");
        assert_eq!(sanitize_path_component("  leading"), "leading");
    }

    #[test]
    fn sanitize_unicode_nfc_normalization() {
        let decomposed = "e\u{0301}";
        assert_eq!(sanitize_path_component(decomposed), "\u{00e9}");
    }

    #[test]
    fn sanitize_pipe_separator() {
        assert_eq!(sanitize_path_component("a | b"), "a｜b");
        assert_eq!(sanitize_path_component("a|b"), "a｜b");
    }

    #[test]
    fn sanitize_drops_control_chars() {
        assert_eq!(sanitize_path_component("a\u{0}b\u{7}c"), "abc");
        assert_eq!(sanitize_path_component("e\u{0}\u{0301}"), "\u{00e9}");
    }

    #[test]
    fn sanitize_windows_forbidden_paths() {
        for c in ['<', '>', ':', '"', '/', '\\', '|', '?', '*'] {
            let input = format!("test{}file", c);
            let result = sanitize_path_component(&input);
            assert!(!result.contains(c), "char '{}' should be replaced", c);
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "",
            "plain",
            "Video: \"Best of 2024\" <HD> | 1080p",
            "a.*",
            "trailing dots...",
            "ends with star *",
            "  spaced   out  ",
            "watch?v=abc123",
            "e\u{0301}cole / ecole \\ back",
            "- ; .",
            "x | | y",
            "\t\n",
            "emoji 🦊 title?",
        ];
        for s in samples {
            let once = sanitize_path_component(s);
            let twice = sanitize_path_component(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", s);
            assert!(!contains_forbidden(&once), "forbidden char left in {:?}", once);
        }
    }

    #[test]
    fn star_is_replaced_not_blanked() {
        assert_eq!(sanitize_path_component("a.*"), "a.＊");
    }
}
