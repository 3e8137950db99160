/// Strip storage-format markup from a page body into normalized plain text.
///
/// Tags are dropped, block-level closers become paragraph breaks, the common
/// entities are decoded, and whitespace runs collapse to single spaces.
pub fn storage_to_text(body: &str) -> String {
    let without_tags = strip_tags(body);
    let decoded = decode_entities(&without_tags);
    normalize_whitespace(&decoded)
}

/// Clamp text to `max_chars` characters for a prompt budget.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

fn strip_tags(input: &str) -> String {
    let chars = input.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(input.len());
    let mut index = 0usize;
    while index < chars.len() {
        if chars[index] == '<' {
            let mut cursor = index + 1;
            while cursor < chars.len() && chars[cursor] != '>' {
                cursor += 1;
            }
            if cursor < chars.len() {
                let tag = chars[index + 1..cursor].iter().collect::<String>();
                if is_block_boundary(&tag) {
                    output.push('\n');
                } else {
                    output.push(' ');
                }
                index = cursor + 1;
                continue;
            }
            // Unterminated tag: keep the remainder as literal text.
        }
        output.push(chars[index]);
        index += 1;
    }
    output
}

fn is_block_boundary(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split([' ', '\t', '/'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "p" | "br" | "li" | "tr" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn normalize_whitespace(input: &str) -> String {
    let mut lines = Vec::new();
    for line in input.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}
