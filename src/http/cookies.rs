//! Per-domain cookie storage.
//!
//! Cookies are stored as plain `name=value` pairs per host, in insertion
//! order. Attributes such as `Path` or `Expires` are not interpreted.

use std::collections::HashMap;

/// Cookie jar keyed by lower-cased host name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    domains: HashMap<String, Vec<(String, String)>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a cookie for `domain`.
    pub fn insert(&mut self, domain: &str, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let cookies = self.domains.entry(domain.to_ascii_lowercase()).or_default();
        match cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value,
            None => cookies.push((name, value)),
        }
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&str> {
        self.domains
            .get(&domain.to_ascii_lowercase())?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Cookies stored for `domain`, in insertion order.
    pub fn cookies_for(&self, domain: &str) -> &[(String, String)] {
        self.domains
            .get(&domain.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, domain: &str, name: &str) -> Option<String> {
        let cookies = self.domains.get_mut(&domain.to_ascii_lowercase())?;
        let index = cookies.iter().position(|(n, _)| n == name)?;
        Some(cookies.remove(index).1)
    }

    /// Copy every cookie of `from` into `to`, overwriting same-named ones.
    pub fn copy_domain(&mut self, from: &str, to: &str) {
        let cookies = self.cookies_for(from).to_vec();
        for (name, value) in cookies {
            self.insert(to, name, value);
        }
    }

    /// Store the cookie carried by a `Set-Cookie` header value.
    ///
    /// Returns false (and stores nothing) when the value has no `=`.
    pub fn store_set_cookie(&mut self, domain: &str, header_value: &str) -> bool {
        match parse_set_cookie(header_value) {
            Some((name, value)) => {
                self.insert(domain, name, value);
                true
            }
            None => false,
        }
    }

    /// `Cookie` header value for `domain`, or `None` when it has no cookies.
    pub fn header_value(&self, domain: &str) -> Option<String> {
        let cookies = self.cookies_for(domain);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.domains.values().all(Vec::is_empty)
    }
}

/// Split a `Set-Cookie` value into `(name, value)`; the value stops at the
/// first `;`.
pub fn parse_set_cookie(header_value: &str) -> Option<(&str, &str)> {
    if header_value.is_empty() {
        return None;
    }
    let separator = header_value.find('=')?;
    let name = &header_value[..separator];
    let rest = &header_value[separator + 1..];
    let value = match rest.find(';') {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_value_stops_at_semicolon() {
        assert_eq!(
            parse_set_cookie("session=abc123; Path=/; HttpOnly"),
            Some(("session", "abc123"))
        );
        assert_eq!(parse_set_cookie("flag=1"), Some(("flag", "1")));
        assert_eq!(parse_set_cookie("empty="), Some(("empty", "")));
        assert_eq!(parse_set_cookie("novalue"), None);
        assert_eq!(parse_set_cookie(""), None);
    }

    #[test]
    fn header_value_joins_in_order() {
        let mut jar = CookieJar::new();
        jar.insert("Example.com", "a", "1");
        jar.insert("example.com", "b", "2");
        jar.insert("example.com", "a", "3");
        assert_eq!(jar.header_value("EXAMPLE.COM").as_deref(), Some("a=3; b=2"));
        assert_eq!(jar.header_value("other.com"), None);
    }

    #[test]
    fn copy_domain_carries_cookies() {
        let mut jar = CookieJar::new();
        assert!(jar.store_set_cookie("a.test", "sid=42; Secure"));
        jar.copy_domain("a.test", "b.test");
        assert_eq!(jar.get("b.test", "sid"), Some("42"));
        assert_eq!(jar.get("a.test", "sid"), Some("42"));
    }

    #[test]
    fn remove_and_empty() {
        let mut jar = CookieJar::new();
        assert!(jar.is_empty());
        jar.insert("x", "k", "v");
        assert!(!jar.is_empty());
        assert_eq!(jar.remove("x", "k").as_deref(), Some("v"));
        assert!(jar.is_empty());
    }
}
