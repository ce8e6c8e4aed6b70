//! Small markup helpers shared by the site adapters

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::normalize::parse::clean_text;

/// Whitespace-normalized text content of an element
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn select_text(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).map(text_of).find(|t| !t.is_empty())
}

pub fn select_all_text(doc: &Html, css: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(css) else {
        return Vec::new();
    };
    doc.select(&selector).map(text_of).filter(|t| !t.is_empty()).collect()
}

pub fn select_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector)
        .find_map(|el| el.value().attr(attr))
        .and_then(clean_text)
}

/// Text of the first match for `css` inside `element`
pub fn child_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    element.select(&selector).map(text_of).find(|t| !t.is_empty())
}

pub fn child_attr(element: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    element
        .select(&selector)
        .find_map(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Elements matching `css`, empty on a bad selector
pub fn elements<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => doc.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Resolve a possibly relative link against the page it was found on
pub fn absolute(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

/// `(label, value)` pairs from `<dt>/<dd>` definition lists
pub fn definition_pairs(doc: &Html, dl_css: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for list in elements(doc, dl_css) {
        let mut label: Option<String> = None;
        for child in list.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "dt" => label = Some(text_of(child)),
                "dd" => {
                    if let Some(l) = label.take() {
                        pairs.push((l, text_of(child)));
                    }
                }
                _ => {}
            }
        }
    }
    pairs
}

/// Value for a label, case-insensitive
pub fn lookup<'a>(pairs: &'a [(String, String)], label: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(l, _)| l.trim_end_matches(':').eq_ignore_ascii_case(label))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Every JSON-LD object on the page, with `@graph` and arrays flattened
pub fn json_ld(doc: &Html) -> Vec<Value> {
    let mut out = Vec::new();
    for script in elements(doc, r#"script[type="application/ld+json"]"#) {
        let raw = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            flatten_ld(value, &mut out);
        }
    }
    out
}

fn flatten_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// First JSON-LD object whose `@type` is one of `types`
pub fn json_ld_of_type(doc: &Html, types: &[&str]) -> Option<Value> {
    json_ld(doc).into_iter().find(|v| match v.get("@type") {
        Some(Value::String(t)) => types.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).any(|t| types.contains(&t)),
        _ => false,
    })
}

/// Embedded application state, e.g. `<script id="__NEXT_DATA__">`
pub fn script_json(doc: &Html, css: &str) -> Option<Value> {
    let raw = elements(doc, css).first()?.text().collect::<String>();
    serde_json::from_str(&raw).ok()
}

/// String form of a JSON scalar
pub fn json_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn json_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.replace([',', '$', ' '], "").parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_pairs_and_lookup() {
        let doc = Html::parse_document(
            "<dl class=\"facts\"><dt>Mileage</dt><dd> 4,300 </dd><dt>VIN:</dt><dd>WP0AF2A92GS192418</dd><dt>Empty</dt><dd></dd></dl>",
        );
        let pairs = definition_pairs(&doc, "dl.facts");
        assert_eq!(lookup(&pairs, "mileage"), Some("4,300"));
        assert_eq!(lookup(&pairs, "VIN"), Some("WP0AF2A92GS192418"));
        assert_eq!(lookup(&pairs, "Empty"), None);
    }

    #[test]
    fn test_json_ld_flattens_graph() {
        let doc = Html::parse_document(
            r#"<script type="application/ld+json">{"@graph":[{"@type":"WebPage"},{"@type":["Car","Product"],"name":"911"}]}</script>"#,
        );
        assert_eq!(json_ld(&doc).len(), 2);
        let car = json_ld_of_type(&doc, &["Car"]).unwrap();
        assert_eq!(json_str(car.get("name")).as_deref(), Some("911"));
    }

    #[test]
    fn test_absolute_and_bad_selector() {
        assert_eq!(
            absolute("https://bringatrailer.com/auctions/results/", "/listing/x/").as_deref(),
            Some("https://bringatrailer.com/listing/x/")
        );
        let doc = Html::parse_document("<p>x</p>");
        assert!(select_text(&doc, "p[[").is_none());
        assert!(elements(&doc, "p[[").is_empty());
    }

    #[test]
    fn test_json_numbers() {
        let v: Value = serde_json::json!({"a": 1200.4, "b": "$98,500", "c": null});
        assert_eq!(json_i64(v.get("a")), Some(1200));
        assert_eq!(json_i64(v.get("b")), Some(98_500));
        assert_eq!(json_i64(v.get("c")), None);
    }
}
