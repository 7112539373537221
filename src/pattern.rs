//! Path and origin matchers used to scope and evaluate CORS policies.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::CorsError;

static PORT_LIST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^(?P<base>.+)     # scheme and host, possibly with wildcards
        :\[               # opening of port list
            (?P<ports>[^\]]*)
        \]$               # closing of port list
    "#,
    )
    .expect("Failed to compile regex: PORT_LIST_REGEX")
});

/// Ant-style request path matcher.
///
/// - `?` matches one character except `/`
/// - `*` matches zero or more characters within a path segment
/// - `**` matches zero or more path segments
/// - `{name}` matches one non-empty path segment
///
/// `/**` matches every path.
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compiles a path pattern. Patterns must start with `/`.
    pub fn new(pattern: &str) -> Result<Self, CorsError> {
        let invalid = || CorsError::InvalidPathPattern(pattern.to_owned());

        let rest = pattern.strip_prefix('/').ok_or_else(invalid)?;

        let mut expr = String::from("^");

        for segment in rest.split('/') {
            if segment == "**" {
                expr.push_str("(?:/.*)?");
                continue;
            }

            expr.push('/');
            translate_segment(segment, &mut expr).ok_or_else(invalid)?;
        }

        expr.push('$');

        let regex = Regex::new(&expr).map_err(|_| invalid())?;

        Ok(Self {
            source: pattern.to_owned(),
            regex,
        })
    }

    /// Returns true if `path` is matched by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Returns the pattern as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Translates a single path segment into regex syntax. Returns `None` on unbalanced braces.
fn translate_segment(segment: &str, out: &mut String) -> Option<()> {
    let mut chars = segment.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                // variable names are irrelevant for matching
                chars.by_ref().find(|&c| c == '}')?;
                out.push_str("[^/]+");
            }
            '}' => return None,
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    Some(())
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for PathPattern {}

/// Origin matcher supporting wildcards and port lists.
///
/// `*` alone matches every origin. Elsewhere `*` matches any run of characters, so
/// `https://*.example.com` matches every subdomain. A trailing port list such as
/// `https://example.com:[8080,8081]` restricts ports; `:[*]` allows any port, including none.
///
/// Matching is case-insensitive and ignores a trailing `/`.
#[derive(Clone)]
pub struct OriginPattern {
    source: String,
    regex: Option<Regex>,
}

impl OriginPattern {
    /// Compiles an origin pattern.
    pub fn new(pattern: &str) -> Result<Self, CorsError> {
        let invalid = || CorsError::InvalidOriginPattern(pattern.to_owned());

        let trimmed = pattern.trim().trim_end_matches('/');

        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed == "*" {
            return Ok(Self::wildcard());
        }

        let (base, ports) = match PORT_LIST_REGEX.captures(trimmed) {
            Some(caps) => (
                caps.name("base").map_or("", |m| m.as_str()),
                Some(caps.name("ports").map_or("", |m| m.as_str())),
            ),
            None => (trimmed, None),
        };

        let mut expr = String::from("(?i)^");
        expr.push_str(&regex::escape(base).replace(r"\*", ".*"));

        match ports {
            None => {}
            Some("*") => expr.push_str(r"(?::\d+)?"),
            Some(list) => {
                let ports = list.split(',').map(str::trim).collect::<Vec<_>>();

                if ports
                    .iter()
                    .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
                {
                    return Err(invalid());
                }

                expr.push_str(":(?:");
                expr.push_str(&ports.join("|"));
                expr.push(')');
            }
        }

        expr.push('$');

        let regex = Regex::new(&expr).map_err(|_| invalid())?;

        Ok(Self {
            source: pattern.to_owned(),
            regex: Some(regex),
        })
    }

    /// The `*` pattern, matching every origin.
    pub fn wildcard() -> Self {
        Self {
            source: "*".to_owned(),
            regex: None,
        }
    }

    /// Returns true if this pattern is the bare `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.regex.is_none()
    }

    /// Returns true if `origin` is matched by this pattern.
    pub fn matches(&self, origin: &str) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => regex.is_match(origin.trim_end_matches('/')),
        }
    }

    /// Returns the pattern as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for OriginPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OriginPattern").field(&self.source).finish()
    }
}

impl PartialEq for OriginPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for OriginPattern {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_all_path() {
        let pattern = PathPattern::new("/**").unwrap();

        for path in ["/", "", "/api", "/api/users", "/api/users/42/", "/a.b/c"] {
            assert!(pattern.matches(path), "{path}");
        }
    }

    #[test]
    fn scoped_paths() {
        let api = PathPattern::new("/api/**").unwrap();
        assert!(api.matches("/api"));
        assert!(api.matches("/api/users/1"));
        assert!(!api.matches("/apix"));
        assert!(!api.matches("/public/api"));

        let single = PathPattern::new("/users/*").unwrap();
        assert!(single.matches("/users/1"));
        assert!(single.matches("/users/"));
        assert!(!single.matches("/users/1/posts"));

        let var = PathPattern::new("/users/{id}/posts").unwrap();
        assert!(var.matches("/users/42/posts"));
        assert!(!var.matches("/users//posts"));

        let one = PathPattern::new("/v?/status").unwrap();
        assert!(one.matches("/v1/status"));
        assert!(!one.matches("/v10/status"));

        let literal = PathPattern::new("/file.txt").unwrap();
        assert!(literal.matches("/file.txt"));
        assert!(!literal.matches("/fileatxt"));
    }

    #[test]
    fn invalid_paths() {
        assert!(PathPattern::new("api/**").is_err());
        assert!(PathPattern::new("/users/{id").is_err());
        assert!(PathPattern::new("/users/id}").is_err());
    }

    #[test]
    fn wildcard_origin() {
        let pattern = OriginPattern::new("*").unwrap();
        assert!(pattern.is_wildcard());
        assert!(pattern.matches("https://app.example.com"));
        assert!(pattern.matches("null"));
    }

    #[test]
    fn subdomain_origin() {
        let pattern = OriginPattern::new("https://*.example.com").unwrap();
        assert!(!pattern.is_wildcard());
        assert!(pattern.matches("https://app.example.com"));
        assert!(pattern.matches("HTTPS://App.Example.com/"));
        assert!(!pattern.matches("http://app.example.com"));
        assert!(!pattern.matches("https://app.example.com:8443"));
        assert!(!pattern.matches("https://example.org"));
    }

    #[test]
    fn origin_port_lists() {
        let any = OriginPattern::new("http://localhost:[*]").unwrap();
        assert!(any.matches("http://localhost"));
        assert!(any.matches("http://localhost:5173"));
        assert!(!any.matches("http://localhost:abc"));

        let some = OriginPattern::new("http://localhost:[3000, 5173]").unwrap();
        assert!(some.matches("http://localhost:3000"));
        assert!(some.matches("http://localhost:5173"));
        assert!(!some.matches("http://localhost:8080"));
        assert!(!some.matches("http://localhost"));
    }

    #[test]
    fn invalid_origins() {
        assert!(OriginPattern::new("").is_err());
        assert!(OriginPattern::new("http://localhost:[80,x]").is_err());
        assert!(OriginPattern::new("http://localhost:[]").is_err());
    }
}
