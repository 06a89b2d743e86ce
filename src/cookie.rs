//! HTTP cookie value and wire formats.
//!
//! Cookie *integrity* (signing, verification) is a capability the caller
//! plugs in; this module only covers the wire formats: parsing a request's
//! `Cookie` header and serialising a `Set-Cookie` directive.

use std::fmt;

/// A response cookie with the attributes hearth surfaces: path, domain,
/// secure, http-only, and max-age (seconds).
///
/// ```rust
/// use hearth::Cookie;
///
/// let cookie = Cookie::new("session", "abc123")
///     .path("/")
///     .http_only(true)
///     .max_age(3600);
///
/// assert_eq!(cookie.to_string(), "session=abc123; Path=/; Max-Age=3600; HttpOnly");
/// ```
#[derive(Clone, Debug)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    secure: bool,
    http_only: bool,
    max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            secure: false,
            http_only: false,
            max_age: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Lifetime in seconds. Zero or negative values expire the cookie.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

/// `Set-Cookie` serialisation: name=value followed by the set attributes.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        Ok(())
    }
}

/// Finds `name` in a request `Cookie` header (`k=v; k2=v2; ...`).
pub(crate) fn find(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_only_set_attributes() {
        assert_eq!(Cookie::new("a", "1").to_string(), "a=1");
        assert_eq!(
            Cookie::new("a", "1").domain("example.com").secure(true).to_string(),
            "a=1; Domain=example.com; Secure"
        );
    }

    #[test]
    fn serialises_full_attribute_set() {
        let cookie = Cookie::new("session", "v")
            .path("/app")
            .domain("example.com")
            .secure(true)
            .http_only(true)
            .max_age(86400);
        assert_eq!(
            cookie.to_string(),
            "session=v; Path=/app; Domain=example.com; Max-Age=86400; Secure; HttpOnly"
        );
    }

    #[test]
    fn finds_cookie_in_header() {
        let header = "session=abc123; theme=dark";
        assert_eq!(find(header, "session").as_deref(), Some("abc123"));
        assert_eq!(find(header, "theme").as_deref(), Some("dark"));
        assert_eq!(find(header, "missing"), None);
    }

    #[test]
    fn tolerates_spacing() {
        assert_eq!(find("a=1;b=2 ;  c=3", "c").as_deref(), Some("3"));
    }
}
