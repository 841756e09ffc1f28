// Text normalization for forum posts before embedding and tagging.
//
// Strips the forum-specific noise (links, markdown, user/subreddit mentions,
// zero-width space entities) that would otherwise dominate short texts.

use std::sync::OnceLock;

use regex_lite::Regex;

struct Patterns {
    urls: Regex,
    markdown_links: Regex,
    markdown_chars: Regex,
    newlines: Regex,
    subreddit_mentions: Regex,
    user_mentions: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        urls: Regex::new(r"http\S+|www\S+").expect("valid regex"),
        markdown_links: Regex::new(r"\[.*?\]\(.*?\)").expect("valid regex"),
        markdown_chars: Regex::new(r"[`*\[\]()]").expect("valid regex"),
        newlines: Regex::new(r"\n+").expect("valid regex"),
        subreddit_mentions: Regex::new(r"r/\w+").expect("valid regex"),
        user_mentions: Regex::new(r"u/\w+").expect("valid regex"),
        whitespace: Regex::new(r"\s{2,}").expect("valid regex"),
    })
}

/// Lowercase and strip links, markdown and mentions from `text`.
pub fn clean(text: &str) -> String {
    let p = patterns();
    let text = text.to_lowercase();

    let text = p.urls.replace_all(&text, "");
    let text = p.markdown_links.replace_all(&text, "");
    let text = p.markdown_chars.replace_all(&text, "");
    let text = p.newlines.replace_all(&text, "\n");
    let text = p.subreddit_mentions.replace_all(&text, "");
    let text = p.user_mentions.replace_all(&text, "");
    // Zero-width space entity, already lowercased above.
    let text = text.replace("&amp;#x200b;", "");
    let text = p.whitespace.replace_all(&text, " ");

    text.trim().to_string()
}
