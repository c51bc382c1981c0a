//! RP-initiated logout URL construction

use url::Url;

/// Build the provider end-session URL
///
/// Sets `id_token_hint`, and `post_logout_redirect_uri` when non-empty, replacing any
/// value the endpoint already carries for them. Other query parameters are kept.
///
/// # Errors
///
/// Returns an error if `end_session_url` is not an absolute URL.
pub fn build_logout_url(
    end_session_url: &str,
    id_token: &str,
    post_logout_redirect_uri: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(end_session_url)?;
    let replaced = |key: &str| {
        key == "id_token_hint"
            || (key == "post_logout_redirect_uri" && !post_logout_redirect_uri.is_empty())
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| !replaced(key))
        .collect();
    {
        let mut query = url.query_pairs_mut();
        query.clear().extend_pairs(&kept);
        query.append_pair("id_token_hint", id_token);
        if !post_logout_redirect_uri.is_empty() {
            query.append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        }
    }
    Ok(url.into())
}

/// Resolve the post-logout target against the request's scheme and host
///
/// Empty means the site root; a path is made absolute; an absolute URL is kept.
#[must_use]
pub fn resolve_post_logout_url(configured: &str, scheme: &str, host: &str) -> String {
    if configured.is_empty() {
        return format!("{scheme}://{host}/");
    }
    if Url::parse(configured).is_ok() {
        return configured.to_string();
    }
    if configured.starts_with('/') {
        format!("{scheme}://{host}{configured}")
    } else {
        format!("{scheme}://{host}/{configured}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_logout_url() {
        let url = build_logout_url("https://idp/logout", "TOKEN", "https://app/").unwrap();
        let query = url.split_once('?').unwrap().1;
        let params: Vec<&str> = query.split('&').collect();

        assert!(params.contains(&"id_token_hint=TOKEN"));
        assert!(params.contains(&"post_logout_redirect_uri=https%3A%2F%2Fapp%2F"));
        assert!(url.starts_with("https://idp/logout?"));
    }

    #[test]
    fn test_build_logout_url_without_redirect() {
        let url = build_logout_url("https://idp.example.com/logout", "TOKEN", "").unwrap();
        assert_eq!(url, "https://idp.example.com/logout?id_token_hint=TOKEN");
    }

    #[test]
    fn test_build_logout_url_keeps_existing_query() {
        let url =
            build_logout_url("https://idp.example.com/logout?client=web", "T", "").unwrap();
        assert_eq!(url, "https://idp.example.com/logout?client=web&id_token_hint=T");
    }

    #[test]
    fn test_build_logout_url_replaces_configured_values() {
        let url = build_logout_url(
            "https://idp.example.com/logout?id_token_hint=old&client=web&post_logout_redirect_uri=x",
            "T",
            "https://app/",
        )
        .unwrap();
        let params: Vec<(String, String)> = Url::parse(&url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect();
        assert_eq!(
            params,
            vec![
                ("client".to_string(), "web".to_string()),
                ("id_token_hint".to_string(), "T".to_string()),
                ("post_logout_redirect_uri".to_string(), "https://app/".to_string()),
            ]
        );

        // Without a new redirect the configured one stays
        let url = build_logout_url(
            "https://idp.example.com/logout?post_logout_redirect_uri=x",
            "T",
            "",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://idp.example.com/logout?post_logout_redirect_uri=x&id_token_hint=T"
        );
    }

    #[test]
    fn test_build_logout_url_rejects_relative_endpoint() {
        assert!(build_logout_url("/logout", "TOKEN", "").is_err());
    }

    #[test]
    fn test_resolve_post_logout_url() {
        assert_eq!(
            resolve_post_logout_url("", "https", "app.example.com"),
            "https://app.example.com/"
        );
        assert_eq!(
            resolve_post_logout_url("/goodbye", "https", "app.example.com"),
            "https://app.example.com/goodbye"
        );
        assert_eq!(
            resolve_post_logout_url("goodbye", "http", "localhost:8080"),
            "http://localhost:8080/goodbye"
        );
        assert_eq!(
            resolve_post_logout_url("https://other.example.com/bye", "http", "app"),
            "https://other.example.com/bye"
        );
    }
}
