//! Navigation - turns location changes into content loads

mod link;
mod listener;

pub use link::route_link;
pub use listener::{NavigationListener, Navigator};

/// A path change signaled by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub path: String,
}

impl NavigationEvent {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Normalize a location path into a content path
///
/// Strips the leading slash and makes sure the path ends with one. The root
/// and the empty path yield `None`, meaning the front page.
pub fn normalize_path(location: &str) -> Option<String> {
    let trimmed = location.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.ends_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("{}/", trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/pages/a"), Some("pages/a/".to_string()));
        assert_eq!(normalize_path("/pages/a/"), Some("pages/a/".to_string()));
        assert_eq!(normalize_path("pages/a"), Some("pages/a/".to_string()));
    }

    #[test]
    fn test_root_is_front_page() {
        assert_eq!(normalize_path(""), None);
        assert_eq!(normalize_path("/"), None);
        assert_eq!(normalize_path("  "), None);
    }
}
