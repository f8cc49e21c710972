//! Minimal cookie jar: enough session handling for two requests.
//!
//! Attributes (`Path`, `HttpOnly`, expiry) are ignored — the jar lives
//! for one bootstrap against one host, so name/value replay is all the
//! wizard needs.

/// Session cookies captured from `Set-Cookie` response headers.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Absorb one `Set-Cookie` header value.
    ///
    /// Malformed values are dropped silently; an upstream UI sending odd
    /// headers must not abort the install.
    pub fn store(&mut self, header_value: &str) {
        let pair = header_value.split(';').next().unwrap_or_default().trim();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().to_string();
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.cookies.push((name.to_string(), value)),
        }
    }

    /// Render the `Cookie` request header, or `None` when empty.
    pub fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_replays_cookies() {
        let mut jar = CookieJar::new();
        jar.store("PHPSESSID=abc123; path=/; HttpOnly");
        jar.store("lang=en");
        assert_eq!(jar.header().as_deref(), Some("PHPSESSID=abc123; lang=en"));
    }

    #[test]
    fn replaces_by_name() {
        let mut jar = CookieJar::new();
        jar.store("PHPSESSID=first");
        jar.store("PHPSESSID=second; Secure");
        assert_eq!(jar.header().as_deref(), Some("PHPSESSID=second"));
    }

    #[test]
    fn ignores_malformed_headers() {
        let mut jar = CookieJar::new();
        jar.store("no-equals-sign");
        jar.store("=value-without-name");
        assert!(jar.is_empty());
        assert_eq!(jar.header(), None);
    }

    #[test]
    fn empty_cookie_value_is_kept() {
        let mut jar = CookieJar::new();
        jar.store("cleared=; path=/");
        assert_eq!(jar.header().as_deref(), Some("cleared="));
    }
}
