//! In-app link routing

use super::NavigationEvent;

/// Decide whether following `href` is in-app navigation
///
/// Returns the navigation event for links that stay inside the client.
/// Empty links, links with a scheme (`https:`, `mailto:`, ...),
/// protocol-relative links and same-page fragments are left to the host.
pub fn route_link(href: &str) -> Option<NavigationEvent> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("//") {
        return None;
    }
    if has_scheme(href) {
        return None;
    }
    let path = href.split(['?', '#']).next().unwrap_or(href);
    Some(NavigationEvent::new(path))
}

fn has_scheme(href: &str) -> bool {
    match href.find(':') {
        Some(pos) => {
            let scheme = &href[..pos];
            !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}
