//! Shared utilities for `report_tree`.
//!
//! - Identity scheme (space-joined node ids)
//! - Short SHA256 keys for caches and fingerprints
//! - Screenshot path helpers

mod hash;
pub mod id;

pub use hash::{hash_parts, short_hash};
pub use id::{
    ID_DELIMITER, TestIds, browser_id, build_id, image_id, image_key, parent_suite_id, result_id,
    suite_id, validate_test_identity,
};

use once_cell::sync::Lazy;
use regex::Regex;

static ATTEMPT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)(\.png)$").expect("attempt suffix regex is valid")
});

/// Kind of screenshot stored for an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Ref,
    Current,
    Diff,
}

impl ImageKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ref => "ref",
            Self::Current => "current",
            Self::Diff => "diff",
        }
    }
}

/// Relative path of a screenshot: `<image dir>/<state>/<browser>~<kind>_<attempt>.png`.
#[must_use]
pub fn image_path(
    image_dir: &str,
    state_name: Option<&str>,
    browser_name: &str,
    kind: ImageKind,
    attempt: u32,
) -> String {
    let mut path = String::new();
    for component in [Some(image_dir), state_name].into_iter().flatten() {
        if component.is_empty() {
            continue;
        }
        path.push_str(component);
        path.push('/');
    }
    path.push_str(&format!("{browser_name}~{}_{attempt}.png", kind.as_str()));
    path
}

/// Rewrite the attempt number at the end of a `*_<n>.png` path.
///
/// Paths that do not end in a numbered png are returned unchanged.
#[must_use]
pub fn replace_attempt_in_path(path: &str, attempt: u32) -> String {
    ATTEMPT_SUFFIX
        .replace(path, format!("{attempt}$2").as_str())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_path_layout() {
        assert_eq!(
            image_path("images", Some("plain"), "chrome", ImageKind::Ref, 2),
            "images/plain/chrome~ref_2.png"
        );
        assert_eq!(
            image_path("images", None, "firefox", ImageKind::Diff, 0),
            "images/firefox~diff_0.png"
        );
    }

    #[test]
    fn test_replace_attempt_in_path() {
        assert_eq!(
            replace_attempt_in_path("images/plain/chrome~current_0.png", 3),
            "images/plain/chrome~current_3.png"
        );
        assert_eq!(
            replace_attempt_in_path("images/plain/chrome~current_10.png", 11),
            "images/plain/chrome~current_11.png"
        );
        assert_eq!(replace_attempt_in_path("images/no-number.png", 4), "images/no-number.png");
    }
}
