//! Peer address normalisation.

/// Reduce a peer URL to its bare `host:port`.
///
/// Everything up to and including `//` is stripped, then everything from
/// the first `/`. Input without a scheme or path passes through.
pub fn normalize_peer_url(url: &str) -> String {
    let host = url.find("//").map_or(url, |i| &url[i + 2..]);
    let host = host.find('/').map_or(host, |i| &host[..i]);
    host.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_path() {
        assert_eq!(normalize_peer_url("http://wall-a:8080/some/path"), "wall-a:8080");
        assert_eq!(normalize_peer_url("ws://10.0.0.2:9000"), "10.0.0.2:9000");
    }

    #[test]
    fn bare_host_unchanged() {
        assert_eq!(normalize_peer_url("wall-b:8081"), "wall-b:8081");
    }

    #[test]
    fn path_without_scheme() {
        assert_eq!(normalize_peer_url("wall-c:1/x"), "wall-c:1");
        assert_eq!(normalize_peer_url("//wall-d:2"), "wall-d:2");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_peer_url(""), "");
        assert_eq!(normalize_peer_url("http://"), "");
    }
}
