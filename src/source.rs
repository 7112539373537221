use crate::{CorsError, CorsPolicy, PathPattern};

/// Path-scoped CORS policy registrations.
///
/// Registrations are checked in the order they were added and the first pattern that matches the
/// request path decides the policy. Requests matching no pattern are not CORS-processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySource {
    mappings: Vec<(PathPattern, CorsPolicy)>,
}

impl PolicySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source registering [`CorsPolicy::permissive()`] for every path (`/**`).
    pub fn permissive() -> Self {
        let catch_all = PathPattern::new("/**").expect("`/**` is a valid path pattern");
        let mut source = Self::new();
        source.mappings.push((catch_all, CorsPolicy::permissive()));
        source
    }

    /// Registers `policy` for request paths matching `pattern`.
    pub fn register(&mut self, pattern: &str, policy: CorsPolicy) -> Result<(), CorsError> {
        let pattern = PathPattern::new(pattern)?;
        log::debug!("registering CORS policy for {}", pattern.as_str());
        self.mappings.push((pattern, policy));
        Ok(())
    }

    /// Chainable form of [`register`](Self::register).
    pub fn with(mut self, pattern: &str, policy: CorsPolicy) -> Result<Self, CorsError> {
        self.register(pattern, policy)?;
        Ok(self)
    }

    /// Returns the policy for the first pattern matching `path`.
    pub fn policy_for(&self, path: &str) -> Option<&CorsPolicy> {
        self.mappings
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| policy)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_covers_every_path() {
        let source = PolicySource::permissive();
        assert_eq!(source.len(), 1);

        for path in ["/", "/api/users", "/a/b/c/d"] {
            assert_eq!(source.policy_for(path), Some(&CorsPolicy::permissive()));
        }
    }

    #[test]
    fn first_match_wins() {
        let strict = CorsPolicy::builder()
            .allowed_origin("https://admin.example.com")
            .build()
            .unwrap();

        let source = PolicySource::new()
            .with("/admin/**", strict.clone())
            .unwrap()
            .with("/**", CorsPolicy::permissive())
            .unwrap();

        assert_eq!(source.policy_for("/admin/users"), Some(&strict));
        assert_eq!(
            source.policy_for("/api/users"),
            Some(&CorsPolicy::permissive())
        );
    }

    #[test]
    fn unmatched_paths_have_no_policy() {
        let source = PolicySource::new()
            .with("/api/**", CorsPolicy::permissive())
            .unwrap();

        assert!(source.policy_for("/static/app.js").is_none());
        assert!(PolicySource::new().is_empty());
        assert!(PolicySource::new().with("api", CorsPolicy::permissive()).is_err());
    }
}
