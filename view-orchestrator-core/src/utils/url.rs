//! URL helpers shared by view resolution and navigation handling

use url::Url;

/// Whether `target` lives under `base`: same origin and a path inside the base path.
#[must_use]
pub fn is_internal_url(target: &Url, base: &Url) -> bool {
    if target.origin() != base.origin() {
        return false;
    }
    let base_path = base.path().trim_end_matches('/');
    if base_path.is_empty() {
        return true;
    }
    let path = target.path();
    path == base_path || path.starts_with(&format!("{base_path}/"))
}

/// Append `path` to `base` the way a user would type it after the server URL.
pub fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let path = if base.path() == "/" {
        path.strip_prefix('/').unwrap_or(path)
    } else {
        path
    };
    Url::parse(&format!("{base}{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_origin_root_is_internal() {
        assert!(is_internal_url(
            &url("https://chat.example.com/team/channels/town"),
            &url("https://chat.example.com/")
        ));
    }

    #[test]
    fn other_origin_is_external() {
        assert!(!is_internal_url(
            &url("https://evil.example.com/"),
            &url("https://chat.example.com/")
        ));
        assert!(!is_internal_url(
            &url("http://chat.example.com/"),
            &url("https://chat.example.com/")
        ));
    }

    #[test]
    fn subpath_server_requires_prefix() {
        let base = url("https://example.com/chat/");
        assert!(is_internal_url(&url("https://example.com/chat/team"), &base));
        assert!(is_internal_url(&url("https://example.com/chat"), &base));
        assert!(!is_internal_url(&url("https://example.com/chatter"), &base));
        assert!(!is_internal_url(&url("https://example.com/other"), &base));
    }

    #[test]
    fn join_strips_leading_slash_on_root_server() {
        let joined = join_path(&url("https://chat.example.com/"), "/team/messages/@bob").unwrap();
        assert_eq!(joined.as_str(), "https://chat.example.com/team/messages/@bob");
    }

    #[test]
    fn join_keeps_path_on_subpath_server() {
        let joined = join_path(&url("https://example.com/chat"), "/team").unwrap();
        assert_eq!(joined.as_str(), "https://example.com/chat/team");
    }
}
