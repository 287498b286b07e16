//! MDX front-matter extraction and markup stripping.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn front_matter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A---\n(.*?)\n---\n(.*)\z").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"))
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[.*?\]\(.*?\)").expect("valid regex"))
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid regex"))
}

/// Split a document into its front-matter fields and body.
///
/// Front-matter is a leading block delimited by `---` lines holding simple
/// `key: value` pairs; surrounding quotes are stripped from values. Nested
/// YAML is not interpreted. Without a front-matter block the whole input
/// is the body.
pub fn extract_front_matter(content: &str) -> (BTreeMap<String, String>, String) {
    let normalized = content.replace("\r\n", "\n");
    let mut fields = BTreeMap::new();

    let Some(caps) = front_matter_re().captures(&normalized) else {
        return (fields, normalized);
    };

    for line in caps[1].lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string();
            fields.insert(key.trim().to_string(), value);
        }
    }

    (fields, caps[2].to_string())
}

/// Strip markup that carries no prose: JSX/HTML tags, fenced code blocks
/// and images. Runs of blank lines collapse to one; the result is trimmed.
/// Inline code and link text are kept.
pub fn clean_markup(body: &str) -> String {
    let text = tag_re().replace_all(body, "");
    let text = fenced_code_re().replace_all(&text, "");
    let text = image_re().replace_all(&text, "");
    let text = blank_run_re().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Split a comma-separated front-matter list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '[' || c == ']').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_matter_parsed() {
        let doc = "---\ntitle: \"Hello: World\"\ndate: 2024-05-01\ntags: rust, rag\n---\nBody line\n";
        let (fm, body) = extract_front_matter(doc);
        assert_eq!(fm["title"], "Hello: World");
        assert_eq!(fm["date"], "2024-05-01");
        assert_eq!(fm["tags"], "rust, rag");
        assert_eq!(body, "Body line\n");
    }

    #[test]
    fn test_no_front_matter() {
        let (fm, body) = extract_front_matter("Just text");
        assert!(fm.is_empty());
        assert_eq!(body, "Just text");
    }

    #[test]
    fn test_crlf_front_matter() {
        let (fm, body) = extract_front_matter("---\r\nlocale: en\r\n---\r\nHi");
        assert_eq!(fm["locale"], "en");
        assert_eq!(body, "Hi");
    }

    #[test]
    fn test_clean_removes_tags_code_and_images() {
        let body = "Intro <Callout type=\"info\">note</Callout>\n\n```rust\nfn main() {}\n```\n\n![diagram](/img/a.png)\nUse `cargo` here.\n\n\n\nEnd";
        assert_eq!(clean_markup(body), "Intro note\n\nUse `cargo` here.\n\nEnd");
    }

    #[test]
    fn test_clean_collapses_whitespace_only_lines() {
        assert_eq!(clean_markup("a\n   \n\t\nb"), "a\n\nb");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("rust, rag,, ai "), vec!["rust", "rag", "ai"]);
        assert_eq!(split_list("[a, b]"), vec!["a", "b"]);
        assert!(split_list("").is_empty());
    }
}
