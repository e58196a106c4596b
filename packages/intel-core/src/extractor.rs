//! Content Extractor: HTML -> (clean text, metadata map, page-type
//! label) (spec §4.3). Strips script/style, collapses whitespace,
//! extracts title/description/og:* meta, classifies page type by
//! keyword heuristic over url+title+body. Page type is an open
//! vocabulary string the Scorer and Explorer treat as opaque.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub clean_text: String,
    pub metadata: HashMap<String, Value>,
    pub page_type: String,
    pub outlinks: Vec<OutLink>,
}

#[derive(Debug, Clone)]
pub struct OutLink {
    pub url: String,
    pub anchor_text: String,
}

fn strip_tag_contents(html: &str, tag: &str) -> String {
    let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>");
    Regex::new(&pattern).unwrap().replace_all(html, " ").into_owned()
}

fn strip_all_tags(html: &str) -> String {
    Regex::new(r"(?s)<[^>]+>").unwrap().replace_all(html, " ").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    Regex::new(r"\s+").unwrap().replace_all(text.trim(), " ").into_owned()
}

fn extract_attr(html: &str, tag_pattern: &str, attr: &str) -> Option<String> {
    let re = Regex::new(tag_pattern).ok()?;
    let captures = re.captures(html)?;
    let tag = captures.get(0)?.as_str();
    let attr_pattern = format!(r#"{attr}=["']([^"']*)["']"#);
    Regex::new(&attr_pattern).ok()?.captures(tag).map(|c| c[1].to_string())
}

fn extract_title(html: &str) -> Option<String> {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
        .unwrap()
        .captures(html)
        .map(|c| collapse_whitespace(&c[1]))
}

fn extract_meta_content(html: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?is)<meta[^>]*(?:name|property)=["']{name}["'][^>]*>"#);
    extract_attr(html, &pattern, "content")
}

fn extract_outlinks(html: &str) -> Vec<OutLink> {
    let re = Regex::new(r#"(?is)<a\s[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    re.captures_iter(html)
        .map(|c| OutLink {
            url: c[1].to_string(),
            anchor_text: collapse_whitespace(&strip_all_tags(&c[2])),
        })
        .collect()
}

/// Open keyword catalogue used to classify page type; the first matching
/// bucket wins (spec §4.3: "page-type label ... open vocabulary string").
const PAGE_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("news", &["breaking", "latest news", "published", "byline", "reporter"]),
    ("profile", &["biography", "bio", "profile", "curriculum vitae"]),
    ("listing", &["directory", "listing", "search results", "results for"]),
    ("investor", &["investor relations", "annual report", "sec filing", "10-k"]),
    ("homepage", &["welcome to", "home page"]),
];

fn classify_page_type(url: &str, title: &str, body: &str) -> String {
    let haystack = format!("{} {} {}", url.to_lowercase(), title.to_lowercase(), body.to_lowercase());
    for (page_type, keywords) in PAGE_TYPE_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return page_type.to_string();
        }
    }
    if url.trim_end_matches('/').matches('/').count() <= 2 {
        return "homepage".to_string();
    }
    "unknown".to_string()
}

/// Extracts clean text, metadata, and a page-type classification from raw
/// HTML (spec §4.3).
pub fn extract(html: &str, url: &str) -> ExtractedContent {
    let mut metadata = HashMap::new();

    if let Some(title) = extract_title(html) {
        metadata.insert("title".to_string(), Value::String(title));
    }
    if let Some(description) = extract_meta_content(html, "description") {
        metadata.insert("description".to_string(), Value::String(description));
    }
    for og_prop in ["og:title", "og:description", "og:type", "og:site_name"] {
        if let Some(value) = extract_meta_content(html, og_prop) {
            metadata.insert(og_prop.to_string(), Value::String(value));
        }
    }

    let outlinks = extract_outlinks(html);

    let mut body = strip_tag_contents(html, "script");
    body = strip_tag_contents(&body, "style");
    body = strip_all_tags(&body);
    let clean_text = collapse_whitespace(&body);

    let title = metadata.get("title").and_then(|v| v.as_str()).unwrap_or_default();
    let page_type = classify_page_type(url, title, &clean_text);

    ExtractedContent { clean_text, metadata, page_type, outlinks }
}

/// Naive punctuation-based sentence splitter for per-sentence embeddings
/// (spec §4.5, §9 open question: "acknowledged imperfect and
/// intentional... test corpus will not depend on specific boundaries").
/// The `regex` crate has no lookaround, so boundaries are found by
/// matching the punctuation run itself and slicing around it, rather
/// than a lookbehind split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let boundary = Regex::new(r"[.!?]+\s+").unwrap();
    let mut sentences = Vec::new();
    let mut last_end = 0;
    for m in boundary.find_iter(text) {
        let sentence = text[last_end..m.start()].trim();
        if !sentence.is_empty() {
            sentences.push(format!("{sentence}{}", &text[m.start()..m.end()].trim_end()));
        }
        last_end = m.end();
    }
    let tail = text[last_end..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_and_collapses_whitespace() {
        let html = "<html><head><style>.x{}</style></head><body><script>evil()</script>\
                     <h1>Hello</h1>\n\n   <p>World</p></body></html>";
        let extracted = extract(html, "https://example.com/");
        assert_eq!(extracted.clean_text, "Hello World");
    }

    #[test]
    fn extracts_title_and_og_meta() {
        let html = r#"<html><head><title>Acme Inc</title>
            <meta property="og:title" content="Acme — Home"/>
            <meta name="description" content="The official Acme site"/>
            </head><body>Acme builds things.</body></html>"#;
        let extracted = extract(html, "https://acme.com/");
        assert_eq!(extracted.metadata["title"], Value::String("Acme Inc".to_string()));
        assert_eq!(extracted.metadata["og:title"], Value::String("Acme — Home".to_string()));
        assert_eq!(extracted.metadata["description"], Value::String("The official Acme site".to_string()));
    }

    #[test]
    fn classifies_news_pages() {
        let html = "<html><body>Breaking news: markets rally</body></html>";
        let extracted = extract(html, "https://news.example.com/article/1");
        assert_eq!(extracted.page_type, "news");
    }

    #[test]
    fn extracts_outlinks_with_anchor_text() {
        let html = r#"<a href="/about">About <b>Us</b></a>"#;
        let extracted = extract(html, "https://acme.com/");
        assert_eq!(extracted.outlinks.len(), 1);
        assert_eq!(extracted.outlinks[0].url, "/about");
        assert_eq!(extracted.outlinks[0].anchor_text, "About Us");
    }

    #[test]
    fn sentence_splitter_handles_basic_punctuation() {
        let sentences = split_sentences("Hello world. How are you? Fine!");
        assert_eq!(sentences.len(), 3);
    }
}
