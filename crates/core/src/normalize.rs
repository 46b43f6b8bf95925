use crate::models::NormalizationPolicy;

/// Collapses every whitespace run to a single space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_text(text: &str, policy: NormalizationPolicy) -> String {
    let lowered = text.to_lowercase();
    match policy {
        NormalizationPolicy::Standard => normalize_whitespace(&lowered),
        NormalizationPolicy::Strict => {
            let kept = lowered
                .chars()
                .filter(|ch| ch.is_whitespace() || is_strict_char(*ch))
                .collect::<String>();
            normalize_whitespace(&kept)
        }
    }
}

fn is_strict_char(ch: char) -> bool {
    matches!(ch, 'a'..='z' | '0'..='9' | '.' | ',' | ':' | '/')
}
