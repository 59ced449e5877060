//! Built-in section delegates

use serde_json::{Map, Value};

use super::{html, ContentTree, Delegate};
use crate::template::Template;

/// Renders `image: { href, alt? }` as a figure
pub struct ImageDelegate;

impl Delegate for ImageDelegate {
    fn name(&self) -> &'static str {
        "image"
    }

    fn accepts(&self, section: &Map<String, Value>) -> bool {
        section
            .get("image")
            .and_then(|i| i.get("href"))
            .and_then(Value::as_str)
            .is_some_and(|href| !href.is_empty() && html::is_safe_url(href))
    }

    fn render(&self, section: &Map<String, Value>, _tree: &ContentTree, out: &mut String) {
        let Some(image) = section.get("image") else {
            return;
        };
        let href = image.get("href").and_then(Value::as_str).unwrap_or_default();
        let alt = image.get("alt").and_then(Value::as_str);

        out.push_str("<figure>");
        out.push_str(&html::image_tag(href, alt));
        if let Some(caption) = image.get("caption").and_then(Value::as_str) {
            out.push_str("<figcaption>");
            out.push_str(&html::escape(caption));
            out.push_str("</figcaption>");
        }
        out.push_str("</figure>");
    }
}

/// Renders `links: [{ href, title? }]` as a navigation list
pub struct LinkDelegate;

impl Delegate for LinkDelegate {
    fn name(&self) -> &'static str {
        "links"
    }

    fn accepts(&self, section: &Map<String, Value>) -> bool {
        matches!(section.get("links"), Some(Value::Array(links)) if links.iter().any(|l| href(l).is_some()))
    }

    fn render(&self, section: &Map<String, Value>, _tree: &ContentTree, out: &mut String) {
        let Some(Value::Array(links)) = section.get("links") else {
            return;
        };

        out.push_str("<nav><ul>");
        for link in links {
            if let Some(href) = href(link) {
                let title = link.get("title").and_then(Value::as_str).unwrap_or(href);
                out.push_str("<li>");
                out.push_str(&html::link_to(href, title));
                out.push_str("</li>");
            }
        }
        out.push_str("</ul></nav>");
    }
}

/// Renders a `markup` string as a nested template
///
/// The markup is compiled with the same grammar as page templates, with
/// `page` bound to the section itself. Markup that does not compile renders
/// nothing.
pub struct MarkupDelegate;

impl Delegate for MarkupDelegate {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn accepts(&self, section: &Map<String, Value>) -> bool {
        section.get("markup").is_some_and(Value::is_string)
    }

    fn render(&self, section: &Map<String, Value>, tree: &ContentTree, out: &mut String) {
        let Some(markup) = section.get("markup").and_then(Value::as_str) else {
            return;
        };
        match Template::compile(markup) {
            Ok(template) => {
                out.push_str(&template.render(&Value::Object(section.clone()), tree));
            }
            Err(e) => tracing::warn!("Skipping section markup: {}", e),
        }
    }
}

fn href(link: &Value) -> Option<&str> {
    link.get("href")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_section() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [{
                "paragraphs": ["Look"],
                "image": { "href": "/images/cat.jpg", "alt": "Cat", "caption": "A cat" }
            }]
        }));
        assert_eq!(
            out,
            "<article><section><p>Look</p><figure><img src=\"/images/cat.jpg\" alt=\"Cat\">\
             <figcaption>A cat</figcaption></figure></section></article>"
        );
    }

    #[test]
    fn test_image_without_href_is_ignored() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({ "sections": [{ "image": { "alt": "nothing" } }] }));
        assert_eq!(out, "<article><section></section></article>");
    }

    #[test]
    fn test_unsafe_urls_from_content() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [
                { "image": { "href": "javascript:alert(1)" } },
                { "links": [{ "href": "javascript:alert(1)", "title": "Run" }, { "href": "/ok/" }] }
            ]
        }));
        assert!(!out.contains("javascript"));
        assert!(!out.contains("<figure>"));
        assert!(out.contains("<li>Run</li>"));
        assert!(out.contains(r#"<a href="/ok/">/ok/</a>"#));
    }

    #[test]
    fn test_markup_section() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [{
                "markup": "<blockquote>{{ page.quote }}{% if page.by %} ({{ page.by }}){% end %}</blockquote>",
                "quote": "Less & more",
                "by": "Dieter"
            }]
        }));
        assert_eq!(
            out,
            "<article><section><blockquote>Less &amp; more (Dieter)</blockquote></section></article>"
        );
    }

    #[test]
    fn test_markup_renders_nested_content() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [{
                "markup": "<aside>{% render article page.body %}</aside>",
                "body": { "sections": [{ "paragraphs": ["inner"] }] }
            }]
        }));
        assert_eq!(
            out,
            "<article><section><aside><article><section><p>inner</p></section></article></aside></section></article>"
        );
    }

    #[test]
    fn test_broken_markup_renders_nothing() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [{ "paragraphs": ["kept"], "markup": "{% if page.x %}unclosed" }]
        }));
        assert_eq!(out, "<article><section><p>kept</p></section></article>");
    }

    #[test]
    fn test_links_section() {
        let tree = ContentTree::with_builtin_delegates();
        let out = tree.render(&json!({
            "sections": [{
                "links": [
                    { "href": "/pages/about/", "title": "About" },
                    { "title": "no href" },
                    { "href": "https://example.com" }
                ]
            }]
        }));
        assert_eq!(
            out,
            "<article><section><nav><ul><li><a href=\"/pages/about/\">About</a></li>\
             <li><a href=\"https://example.com\" target=\"_blank\" rel=\"noopener\">https://example.com</a></li>\
             </ul></nav></section></article>"
        );
    }
}
