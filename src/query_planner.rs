//! Sustainability-biased search queries for a product.
//!
//! Query order is stable: discovery consumes the list front to back and stops
//! once it has enough alternatives.

pub const QUALIFIERS: [&str; 4] = [
    "recycled sustainable",
    "eco friendly organic",
    "renewed refurbished",
    "biodegradable recyclable",
];

const STOP_WORDS: [&str; 4] = ["the", "and", "for", "with"];
const PHRASE_TOKENS: usize = 2;

/// Short phrase from a title: first two tokens longer than two characters
/// that are not stop words. `"product"` when nothing survives.
pub fn phrase_from_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .take(PHRASE_TOKENS)
        .collect();
    if tokens.is_empty() {
        "product".to_string()
    } else {
        tokens.join(" ")
    }
}

/// Product type wins over the title when both are known.
pub fn search_phrase(product_type: Option<&str>, title: &str) -> String {
    match product_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => phrase_from_title(title),
    }
}

pub fn plan_queries(product_type: Option<&str>, title: &str) -> Vec<String> {
    let phrase = search_phrase(product_type, title);
    QUALIFIERS
        .iter()
        .map(|qualifier| format!("{phrase} {qualifier}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_shortened_to_meaningful_tokens() {
        assert_eq!(phrase_from_title("The Hydro Flask, 32 oz with Lid"), "hydro flask");
        assert_eq!(phrase_from_title("A to Z"), "product");
        assert_eq!(phrase_from_title("Apple iPhone 13 (Renewed)"), "apple iphone");
    }

    #[test]
    fn product_type_takes_precedence() {
        let queries = plan_queries(Some("bottle"), "Eco Water Bottle");
        assert_eq!(
            queries,
            vec![
                "bottle recycled sustainable",
                "bottle eco friendly organic",
                "bottle renewed refurbished",
                "bottle biodegradable recyclable",
            ]
        );
    }

    #[test]
    fn blank_type_uses_title() {
        let queries = plan_queries(Some("  "), "Bamboo toothbrush for kids");
        assert_eq!(queries[0], "bamboo toothbrush recycled sustainable");
        assert_eq!(queries, plan_queries(None, "Bamboo toothbrush for kids"));
    }
}
