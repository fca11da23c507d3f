use secrecy::{ExposeSecret, SecretString};
use url::Url;

const REDACTED: &str = "REDACTED";

/// Format a connection URI for diagnostics, hiding the password unless
/// show_secrets is set.
///
/// Both the userinfo password (`user:pw@host`) and a `password=` query
/// parameter are masked. Anything that does not parse as a URI with an
/// authority is redacted whole.
pub fn mask_uri(uri: &SecretString, show_secrets: bool) -> String {
    let uri = uri.expose_secret();
    if show_secrets {
        return uri.to_string();
    }

    let mut url = match Url::parse(uri) {
        Ok(url) if !url.cannot_be_a_base() => url,
        _ => return format!("[{REDACTED}]"),
    };

    if url.password().is_some() && url.set_password(Some(REDACTED)).is_err() {
        return format!("[{REDACTED}]");
    }

    let has_password_param = url
        .query_pairs()
        .any(|(key, _)| key.eq_ignore_ascii_case("password"));
    if has_password_param {
        let pairs = url
            .query_pairs()
            .map(|(key, value)| {
                if key.eq_ignore_ascii_case("password") {
                    (key.into_owned(), REDACTED.to_string())
                } else {
                    (key.into_owned(), value.into_owned())
                }
            })
            .collect::<Vec<_>>();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    url.to_string()
}
