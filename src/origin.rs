//! Serving origin and the mapping between request URLs and manifest paths.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

/// Manifest path of the root document.
pub const ROOT_PATH: &str = "/";

static CACHE_BUST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?v=.*$").expect("valid regex"));

/// The origin the application is served from, e.g. `https://app.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingOrigin {
    root: Url,
}

impl ServingOrigin {
    /// Parses an origin. Any path, query or fragment is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `origin` is not an absolute
    /// hierarchical URL.
    pub fn parse(origin: &str) -> Result<Self> {
        let url = Url::parse(origin).map_err(|e| Error::InvalidUrl(format!("{origin}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{origin}: not a hierarchical URL")));
        }
        let mut root = url;
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        Ok(Self { root })
    }

    /// Returns the origin root URL (always ending in `/`).
    #[must_use]
    pub const fn root(&self) -> &Url {
        &self.root
    }

    /// Returns true if `url` is served from this origin.
    #[must_use]
    pub fn contains(&self, url: &Url) -> bool {
        url.origin() == self.root.origin()
    }

    /// Derives the manifest path for a request URL.
    ///
    /// Returns `None` for URLs on another origin. The leading slash is
    /// dropped, a `?v=...` suffix is stripped, the fragment is ignored, and an
    /// empty result collapses to [`ROOT_PATH`].
    #[must_use]
    pub fn request_path(&self, url: &Url) -> Option<String> {
        if !self.contains(url) {
            return None;
        }
        let mut key = url.path().trim_start_matches('/').to_string();
        if let Some(query) = url.query() {
            key.push('?');
            key.push_str(query);
        }
        let key = CACHE_BUST_RE.replace(&key, "");
        if key.is_empty() {
            Some(ROOT_PATH.to_string())
        } else {
            Some(key.into_owned())
        }
    }

    /// Same as [`request_path`](Self::request_path) for a stored key string.
    /// Keys that do not parse as URLs have no path.
    #[must_use]
    pub fn key_path(&self, key: &str) -> Option<String> {
        Url::parse(key).ok().and_then(|url| self.request_path(&url))
    }

    /// Builds the absolute URL for a manifest path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path cannot be joined onto the
    /// origin.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        if path == ROOT_PATH {
            return Ok(self.root.clone());
        }
        self.root
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }
}

impl fmt::Display for ServingOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> ServingOrigin {
        ServingOrigin::parse("https://app.test").unwrap()
    }

    fn path(url: &str) -> Option<String> {
        origin().request_path(&Url::parse(url).unwrap())
    }

    #[test]
    fn plain_asset_path() {
        assert_eq!(path("https://app.test/main.dart.js").as_deref(), Some("main.dart.js"));
        assert_eq!(
            path("https://app.test/assets/fonts/MaterialIcons-Regular.otf").as_deref(),
            Some("assets/fonts/MaterialIcons-Regular.otf")
        );
    }

    #[test]
    fn root_variants_collapse_to_marker() {
        assert_eq!(path("https://app.test").as_deref(), Some(ROOT_PATH));
        assert_eq!(path("https://app.test/").as_deref(), Some(ROOT_PATH));
        assert_eq!(path("https://app.test/#/home").as_deref(), Some(ROOT_PATH));
        assert_eq!(path("https://app.test/?v=123").as_deref(), Some(ROOT_PATH));
    }

    #[test]
    fn cache_busting_suffix_is_stripped() {
        assert_eq!(path("https://app.test/main.dart.js?v=1700000000").as_deref(), Some("main.dart.js"));
        assert_eq!(path("https://app.test/flutter.js?a=1?v=9").as_deref(), Some("flutter.js?a=1"));
    }

    #[test]
    fn other_queries_are_kept() {
        assert_eq!(path("https://app.test/data.json?lang=en").as_deref(), Some("data.json?lang=en"));
    }

    #[test]
    fn foreign_origin_has_no_path() {
        assert_eq!(path("https://cdn.test/main.dart.js"), None);
        assert_eq!(path("http://app.test/main.dart.js"), None);
        assert_eq!(path("https://app.test:8443/main.dart.js"), None);
    }

    #[test]
    fn key_path_rejects_garbage() {
        assert_eq!(origin().key_path("manifest"), None);
        assert_eq!(origin().key_path("https://app.test/index.html").as_deref(), Some("index.html"));
    }

    #[test]
    fn url_for_inverts_request_path() {
        let origin = origin();
        assert_eq!(origin.url_for(ROOT_PATH).unwrap().as_str(), "https://app.test/");
        assert_eq!(origin.url_for("assets/a.png").unwrap().as_str(), "https://app.test/assets/a.png");
        for p in ["index.html", "canvaskit/canvaskit.wasm", ROOT_PATH] {
            let url = origin.url_for(p).unwrap();
            assert_eq!(origin.request_path(&url).as_deref(), Some(p));
        }
    }

    #[test]
    fn parse_discards_path_and_displays_bare() {
        let origin = ServingOrigin::parse("https://app.test/some/page?x=1#frag").unwrap();
        assert_eq!(origin.root().as_str(), "https://app.test/");
        assert_eq!(origin.to_string(), "https://app.test");
    }

    #[test]
    fn parse_rejects_non_hierarchical() {
        assert!(ServingOrigin::parse("mailto:someone@app.test").is_err());
        assert!(ServingOrigin::parse("not a url").is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn same_origin_always_has_a_path(segment in "[a-z0-9_.-]{0,20}", version in "[0-9]{0,10}") {
                let url = Url::parse(&format!("https://app.test/{segment}?v={version}")).unwrap();
                let derived = origin().request_path(&url).unwrap();
                prop_assert!(!derived.is_empty());
                prop_assert!(!derived.contains("?v="));
            }

            #[test]
            fn cache_busting_never_changes_path(segment in "[a-z][a-z0-9_]{0,20}\\.js", version in "[0-9a-f]{1,12}") {
                let plain = Url::parse(&format!("https://app.test/{segment}")).unwrap();
                let busted = Url::parse(&format!("https://app.test/{segment}?v={version}")).unwrap();
                prop_assert_eq!(origin().request_path(&plain), origin().request_path(&busted));
            }
        }
    }
}
