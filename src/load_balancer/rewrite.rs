// src/load_balancer/rewrite.rs
use url::Url;

/// Rewrite `request` in place so that it addresses `target`.
///
/// Scheme, host and path always come from the target. Query strings are
/// joined with the request's parameters first. The target's userinfo is only
/// used when the request carries no username of its own.
pub fn rewrite_url(request: &mut Url, target: &Url) {
    let mut rewritten = target.clone();

    let query = merge_query(request.query(), target.query());
    rewritten.set_query(query.as_deref());

    if !request.username().is_empty() {
        // Backends are validated to have a host, so these setters cannot fail.
        let _ = rewritten.set_username(request.username());
        let _ = rewritten.set_password(request.password());
    }

    rewritten.set_fragment(request.fragment());

    *request = rewritten;
}

fn merge_query(request: Option<&str>, target: Option<&str>) -> Option<String> {
    let request = request.filter(|q| !q.is_empty());
    let target = target.filter(|q| !q.is_empty());

    match (request, target) {
        (Some(req), Some(tgt)) => Some(format!("{req}&{tgt}")),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(frontend: &str, backend: &str) -> Url {
        let mut request = Url::parse(frontend).unwrap();
        let target = Url::parse(backend).unwrap();
        rewrite_url(&mut request, &target);
        request
    }

    fn assert_rewrite(frontend: &str, backend: &str, want: &str) {
        let got = rewrite(frontend, backend);
        let want = Url::parse(want).unwrap();
        assert_eq!(got, want, "{frontend} + {backend}");
    }

    #[test]
    fn test_scheme_and_host_come_from_target() {
        assert_rewrite("http://a/", "http://b/", "http://b/");
        assert_rewrite("http://a/", "https://b/", "https://b/");
        assert_rewrite("http://a:8080/", "http://b:9090/", "http://b:9090/");
    }

    #[test]
    fn test_path_comes_from_target() {
        assert_rewrite("http://a/path", "http://b/", "http://b/");
        assert_rewrite("http://a/", "http://b/path", "http://b/path");
    }

    #[test]
    fn test_query_merge() {
        assert_rewrite("http://a?param=value", "http://b", "http://b?param=value");
        assert_rewrite("http://a/", "http://b?param=value", "http://b?param=value");
        assert_rewrite(
            "http://a?paramA=value1",
            "http://b?paramB=value2",
            "http://b?paramA=value1&paramB=value2",
        );
    }

    #[test]
    fn test_empty_queries_are_dropped() {
        let got = rewrite("http://a/?", "http://b/?");
        assert_eq!(got.query(), None);
        assert_eq!(got.as_str(), "http://b/");
    }

    #[test]
    fn test_userinfo() {
        assert_rewrite("http://user:pass@a/", "http://b/", "http://user:pass@b/");
        assert_rewrite("http://a/", "http://user:pass@b/", "http://user:pass@b/");
        assert_rewrite(
            "http://userA:passA@a/",
            "http://userB:passB@b/",
            "http://userA:passA@b/",
        );
    }

    #[test]
    fn test_username_only() {
        assert_rewrite("http://user@a/", "http://b/", "http://user@b/");
        assert_rewrite("http://a/", "http://user@b/", "http://user@b/");
        assert_rewrite("http://userA@a/", "http://userBB@b/", "http://userA@b/");
        // request userinfo wins as a whole, target password is discarded
        assert_rewrite("http://userA@a/", "http://userB:passB@b/", "http://userA@b/");
    }

    #[test]
    fn test_fragment_is_kept() {
        assert_rewrite("http://a/#top", "http://b/x", "http://b/x#top");
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let first = rewrite("http://u:p@a/x?q=1", "https://b:8443/y?r=2");
        let second = rewrite("http://u:p@a/x?q=1", "https://b:8443/y?r=2");
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "https://u:p@b:8443/y?q=1&r=2");
    }
}
