use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::model::ProductDescriptor;

pub const RENEWED_TERMS: [&str; 2] = ["renewed", "refurbished"];

pub const MATERIAL_TERMS: [&str; 12] = [
    "stainless steel",
    "steel",
    "aluminum",
    "glass",
    "plastic",
    "polycarbonate",
    "recycled",
    "biodegradable",
    "leather",
    "cotton",
    "nylon",
    "polyester",
];

pub const PRODUCT_TYPE_TERMS: [&str; 40] = [
    "phone", "smartphone", "laptop", "computer", "headphones", "earbuds", "camera", "backpack",
    "jacket", "shoes", "bottle", "notebook", "charger", "battery", "tablet", "vacuum", "cleaner",
    "bag", "watch", "speaker", "keyboard", "mouse", "monitor", "chair", "desk", "lamp", "fan",
    "heater", "blender", "mixer", "kettle", "toaster", "iron", "dryer", "washer", "dishwasher",
    "refrigerator", "microwave", "mug", "toothbrush",
];

fn vocabulary_regex(terms: &[&str]) -> Regex {
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({alternation})(?:e?s)?\b")).unwrap()
}

lazy_static! {
    static ref MATERIAL_RE: Regex = vocabulary_regex(&MATERIAL_TERMS);
    static ref PRODUCT_TYPE_RE: Regex = vocabulary_regex(&PRODUCT_TYPE_TERMS);
    static ref TITLE_SUFFIX_RE: Regex =
        Regex::new(r"(?i)\s*(?::\s*amazon\..+|\|\s*[^|]+)$").unwrap();
    static ref SEPARATOR_RE: Regex = Regex::new(r"[-_]+").unwrap();
    static ref PRODUCT_TITLE_SEL: Selector = Selector::parse("#productTitle").unwrap();
    static ref OG_TITLE_SEL: Selector = Selector::parse("meta[property='og:title']").unwrap();
    static ref TITLE_SEL: Selector = Selector::parse("title").unwrap();
    static ref BULLETS_SEL: Selector = Selector::parse("#feature-bullets li").unwrap();
    static ref DETAILS_SEL: Selector = Selector::parse(
        "#productDetails_techSpec_section_1, #productDetails_detailBullets_sections1, #detailBullets_feature_div"
    )
    .unwrap();
    static ref BREADCRUMB_SEL: Selector = Selector::parse(
        "#wayfinding-breadcrumbs_feature_div, [class*=\"breadcrumb\"], [itemtype*=\"BreadcrumbList\"]"
    )
    .unwrap();
}

/// Case-insensitive renewed/refurbished check.
pub fn mentions_renewed(text: &str) -> bool {
    let lower = text.to_lowercase();
    RENEWED_TERMS.iter().any(|term| lower.contains(term))
}

fn first_term(re: &Regex, corpus: &str) -> Option<String> {
    re.captures(corpus)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// URL-derived phrase: first path segment with separators turned into
/// spaces, or the hostname when the path starts with a `dp` identifier.
pub fn title_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let first_segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()));

    if let Some(segment) = first_segment {
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        if !decoded.to_lowercase().starts_with("dp") {
            let phrase = SEPARATOR_RE.replace_all(&decoded, " ");
            let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
            if !phrase.is_empty() {
                return Some(phrase);
            }
        }
    }

    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns a product URL plus (optionally) its markup into a descriptor.
///
/// Never fails: missing markup or missing elements only leave fields empty.
pub struct DescriptorExtractor {
    max_text_chars: usize,
}

impl Default for DescriptorExtractor {
    fn default() -> Self {
        Self::new(20_000)
    }
}

impl DescriptorExtractor {
    pub fn new(max_text_chars: usize) -> Self {
        Self { max_text_chars }
    }

    pub fn extract(&self, url: &str, html: Option<&str>) -> ProductDescriptor {
        if Url::parse(url).is_err() {
            return ProductDescriptor::empty(url);
        }

        let (page_title, bullets, details, breadcrumbs) = match html {
            Some(html) => {
                let document = Html::parse_document(html);
                (
                    self.extract_title(&document),
                    self.joined_text(&document, &BULLETS_SEL),
                    self.joined_text(&document, &DETAILS_SEL),
                    self.joined_text(&document, &BREADCRUMB_SEL),
                )
            }
            None => (None, String::new(), String::new(), String::new()),
        };

        let title = page_title.or_else(|| title_from_url(url));
        let title_text = title.as_deref().unwrap_or("");

        let is_renewed = mentions_renewed(title_text) || mentions_renewed(&bullets);

        let materials_corpus = format!("{title_text} {bullets} {details}");
        let type_corpus = format!("{breadcrumbs} {title_text}");

        ProductDescriptor {
            is_renewed,
            materials_hint: first_term(&MATERIAL_RE, &materials_corpus),
            product_type: first_term(&PRODUCT_TYPE_RE, &type_corpus),
            title,
            source_url: url.to_string(),
        }
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        if let Some(elem) = document.select(&PRODUCT_TITLE_SEL).next() {
            let text = collapse_whitespace(&elem.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }

        if let Some(content) = document
            .select(&OG_TITLE_SEL)
            .next()
            .and_then(|meta| meta.value().attr("content"))
        {
            let text = collapse_whitespace(content);
            if !text.is_empty() {
                return Some(text);
            }
        }

        let raw = document
            .select(&TITLE_SEL)
            .next()
            .map(|elem| elem.text().collect::<String>())?;
        let text = collapse_whitespace(&raw);
        let text = TITLE_SUFFIX_RE.replace(&text, "").trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn joined_text(&self, document: &Html, selector: &Selector) -> String {
        let mut out = String::new();
        for elem in document.select(selector) {
            let text = collapse_whitespace(&elem.text().collect::<Vec<_>>().join(" "));
            if text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&text);
            if out.len() >= self.max_text_chars {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_slug_becomes_title_without_page() {
        let extractor = DescriptorExtractor::default();
        let d = extractor.extract("https://www.amazon.com/Eco-Water-Bottle/dp/B000X", None);
        assert_eq!(d.title.as_deref(), Some("Eco Water Bottle"));
        assert_eq!(d.product_type.as_deref(), Some("bottle"));
        assert!(!d.is_renewed);
        assert_eq!(d.materials_hint, None);
    }

    #[test]
    fn dp_path_falls_back_to_hostname() {
        assert_eq!(
            title_from_url("https://www.amazon.com/dp/B08N5WRWNW").as_deref(),
            Some("amazon.com")
        );
        assert_eq!(
            title_from_url("https://shop.example.org/").as_deref(),
            Some("shop.example.org")
        );
        assert_eq!(
            title_from_url("https://x.com/Bamboo__Tooth-Brush%20Set/p/1").as_deref(),
            Some("Bamboo Tooth Brush Set")
        );
    }

    #[test]
    fn unparsable_url_yields_empty_descriptor() {
        let d = DescriptorExtractor::default().extract("not a url", Some("<title>x</title>"));
        assert_eq!(d, ProductDescriptor::empty("not a url"));
    }

    #[test]
    fn page_fields_are_read_from_markup() {
        let html = r#"
            <html><head><title>Ignored : Amazon.com : Electronics</title></head>
            <body>
              <div id="wayfinding-breadcrumbs_feature_div">Electronics › Headphones</div>
              <span id="productTitle">  Sony WH-1000XM4 Wireless (Renewed) </span>
              <div id="feature-bullets"><ul>
                <li>Industry-leading noise cancelling</li>
                <li>Ear cushions made from recycled plastic</li>
              </ul></div>
            </body></html>
        "#;
        let d = DescriptorExtractor::default().extract("https://www.amazon.com/dp/B0863TXGM3", Some(html));
        assert_eq!(d.title.as_deref(), Some("Sony WH-1000XM4 Wireless (Renewed)"));
        assert!(d.is_renewed);
        assert_eq!(d.product_type.as_deref(), Some("headphones"));
        assert_eq!(d.materials_hint.as_deref(), Some("recycled"));
    }

    #[test]
    fn title_tag_suffix_is_stripped() {
        let html = "<html><head><title>Stainless Steel Kettle : Amazon.co.uk: Home</title></head></html>";
        let d = DescriptorExtractor::default().extract("https://www.amazon.co.uk/dp/B01", Some(html));
        assert_eq!(d.title.as_deref(), Some("Stainless Steel Kettle"));
        assert_eq!(d.materials_hint.as_deref(), Some("stainless steel"));
        assert_eq!(d.product_type.as_deref(), Some("kettle"));
    }

    #[test]
    fn refurbished_in_bullets_marks_renewed() {
        let html = r#"<div id="feature-bullets"><li>Certified REFURBISHED unit</li></div>"#;
        let d = DescriptorExtractor::default().extract("https://www.amazon.com/Old-Laptop/dp/B1", Some(html));
        assert_eq!(d.title.as_deref(), Some("Old Laptop"));
        assert!(d.is_renewed);
        assert_eq!(d.product_type.as_deref(), Some("laptop"));
    }

    #[test]
    fn vocabulary_respects_word_boundaries() {
        let d = DescriptorExtractor::default().extract("https://example.com/Fantastic-Environment-Poster", None);
        assert_eq!(d.product_type, None);
        assert_eq!(d.materials_hint, None);
    }
}
