//! HTML helper functions

/// HTML escape a string for text and attribute positions
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Schemes a content-supplied URL may use
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Whether a content-supplied URL is safe to put in `href` or `src`
///
/// Relative URLs and the schemes in [`ALLOWED_SCHEMES`] pass. Anything else
/// (`javascript:`, `data:`, `vbscript:`, ...) is refused. Browsers drop tabs
/// and newlines inside a scheme, so those are ignored when reading it.
pub fn is_safe_url(url: &str) -> bool {
    let cleaned: String = url
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_control() && !c.is_whitespace())
        .collect();

    let Some(colon) = cleaned.find(':') else {
        return true;
    };
    if cleaned[..colon].contains(['/', '?', '#']) {
        return true;
    }
    let scheme = cleaned[..colon].to_ascii_lowercase();
    ALLOWED_SCHEMES.contains(&scheme.as_str())
}

/// Generate an image tag; empty when `src` is not a safe URL
///
/// # Examples
/// ```ignore
/// image_tag("/images/photo.jpg", Some("My Photo")) // -> <img src="/images/photo.jpg" alt="My Photo">
/// ```
pub fn image_tag(src: &str, alt: Option<&str>) -> String {
    if !is_safe_url(src) {
        tracing::warn!("Refusing image source {:?}", src);
        return String::new();
    }
    match alt {
        Some(alt) => format!(r#"<img src="{}" alt="{}">"#, escape(src), escape(alt)),
        None => format!(r#"<img src="{}" alt="">"#, escape(src)),
    }
}

/// Generate an anchor tag
///
/// Links with a scheme open in a new tab; everything else is navigated in-app.
/// An unsafe `href` leaves only the escaped text.
pub fn link_to(href: &str, text: &str) -> String {
    if !is_safe_url(href) {
        tracing::warn!("Refusing link target {:?}", href);
        return escape(text);
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        format!(
            r#"<a href="{}" target="_blank" rel="noopener">{}</a>"#,
            escape(href),
            escape(text)
        )
    } else {
        format!(r#"<a href="{}">{}</a>"#, escape(href), escape(text))
    }
}
