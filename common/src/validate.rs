use url::Url;

/// Schemes a script may reach. Everything else is rejected before dispatch.
pub const ALLOWED_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

/// Parses `url` as an absolute URL with an allowed scheme.
pub fn parse_url(url: &str) -> Option<Url> {
    let url = Url::parse(url).ok()?;

    if ALLOWED_SCHEMES.contains(&url.scheme()) {
        Some(url)
    } else {
        None
    }
}

#[inline]
pub fn check_url(url: &str) -> bool {
    parse_url(url).is_some()
}
