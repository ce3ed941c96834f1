//! Content snippets for result rows.

pub const SNIPPET_LIMIT: usize = 120;

const STRIPPED_GLYPHS: [char; 8] = ['#', '*', '_', '`', '>', '[', ']', '"'];

/// Flatten markdown into a short plain-text snippet: strip markdown glyphs,
/// collapse whitespace, cap at `limit` characters with trailing punctuation
/// trimmed and an ellipsis appended. Empty content reads "No content".
pub fn build_snippet(content_md: Option<&str>, limit: usize) -> String {
    let Some(content) = content_md else {
        return "No content".to_string();
    };
    let stripped: String = content
        .chars()
        .map(|ch| if STRIPPED_GLYPHS.contains(&ch) { ' ' } else { ch })
        .collect();
    let plain = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if plain.is_empty() {
        return "No content".to_string();
    }
    if plain.chars().count() <= limit {
        return plain;
    }
    let head: String = plain.chars().take(limit).collect();
    format!("{}…", head.trim_end_matches([',', '.', ';', ':', ' ']))
}
