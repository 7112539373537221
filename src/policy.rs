use std::collections::HashSet;

use actix_web::http::{
    header::{HeaderName, HeaderValue},
    Method,
};

use crate::{AllOrSome, CorsError, OriginPattern};

/// Methods allowed when a policy never configures any.
const DEFAULT_METHODS: [Method; 3] = [Method::GET, Method::HEAD, Method::POST];

/// An immutable set of cross-origin access rules.
///
/// Policies are built once at start-up, either with [`CorsPolicy::builder()`] or from
/// [`CorsSettings`](crate::CorsSettings), and then registered for one or more path patterns on a
/// [`PolicySource`](crate::PolicySource).
#[derive(Debug, Clone, PartialEq)]
pub struct CorsPolicy {
    pub(crate) allowed_origins: AllOrSome<HashSet<String>>,
    pub(crate) allowed_origin_patterns: Vec<OriginPattern>,
    pub(crate) allowed_methods: AllOrSome<HashSet<Method>>,
    pub(crate) allowed_methods_baked: Option<HeaderValue>,
    #[allow(clippy::mutable_key_type)]
    pub(crate) allowed_headers: AllOrSome<HashSet<HeaderName>>,
    pub(crate) exposed_headers_baked: Option<HeaderValue>,
    pub(crate) allow_credentials: bool,
    pub(crate) max_age: Option<u64>,
}

impl CorsPolicy {
    /// Starts building a policy that allows nothing until told otherwise.
    pub fn builder() -> CorsPolicyBuilder {
        CorsPolicyBuilder::default()
    }

    /// A wide-open policy: any origin, any method, any header, credentials allowed.
    ///
    /// Origins are matched by the `*` *pattern*, so the concrete request `Origin` is echoed in
    /// `Access-Control-Allow-Origin` and never the literal `*`.
    ///
    /// # Security
    /// Any site can make credentialed requests and read the responses. Restrict origins with
    /// [`CorsPolicyBuilder::allowed_origin`] when cookies or `Authorization` headers carry
    /// meaningful authority.
    pub fn permissive() -> Self {
        Self {
            allowed_origins: AllOrSome::Some(HashSet::new()),
            allowed_origin_patterns: vec![OriginPattern::wildcard()],
            allowed_methods: AllOrSome::All,
            allowed_methods_baked: None,
            allowed_headers: AllOrSome::All,
            exposed_headers_baked: None,
            allow_credentials: true,
            max_age: None,
        }
    }

    /// Returns whether credentialed requests are allowed.
    pub fn allows_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Returns the pre-flight cache lifetime in seconds, if any.
    pub fn max_age(&self) -> Option<u64> {
        self.max_age
    }

    /// Resolves the `Access-Control-Allow-Origin` value for a request `Origin`.
    ///
    /// Under the `*` origin pattern the request value is echoed byte-for-byte, without being
    /// inspected.
    pub(crate) fn check_origin(&self, origin: &HeaderValue) -> Result<HeaderValue, CorsError> {
        let allowed_origins = match &self.allowed_origins {
            // validated: never combined with credentials
            AllOrSome::All => return Ok(HeaderValue::from_static("*")),
            AllOrSome::Some(allowed_origins) => allowed_origins,
        };

        if self
            .allowed_origin_patterns
            .iter()
            .any(OriginPattern::is_wildcard)
        {
            return Ok(origin.clone());
        }

        let origin_str = origin.to_str().map_err(|_| CorsError::BadOrigin)?;

        if allowed_origins.contains(&normalize_origin(origin_str))
            || self
                .allowed_origin_patterns
                .iter()
                .any(|pattern| pattern.matches(origin_str))
        {
            Ok(origin.clone())
        } else {
            Err(CorsError::OriginNotAllowed)
        }
    }

    /// Resolves the `Access-Control-Allow-Methods` value for an actual request's method.
    ///
    /// When every method is allowed, the method is echoed back.
    pub(crate) fn check_method(&self, method: &Method) -> Result<HeaderValue, CorsError> {
        match &self.allowed_methods {
            AllOrSome::All => {
                HeaderValue::from_str(method.as_str()).map_err(|_| CorsError::BadRequestMethod)
            }

            AllOrSome::Some(methods) if methods.contains(method) => self
                .allowed_methods_baked
                .clone()
                .ok_or(CorsError::MethodNotAllowed),

            AllOrSome::Some(_) => Err(CorsError::MethodNotAllowed),
        }
    }

    /// Resolves the `Access-Control-Allow-Methods` value for a pre-flight
    /// `Access-Control-Request-Method`.
    ///
    /// When every method is allowed, the requested value is echoed as-is, even if it is not a
    /// valid method token.
    pub(crate) fn check_requested_method(
        &self,
        requested: &HeaderValue,
    ) -> Result<HeaderValue, CorsError> {
        if self.allowed_methods.is_all() {
            return Ok(requested.clone());
        }

        let method =
            Method::from_bytes(requested.as_bytes()).map_err(|_| CorsError::BadRequestMethod)?;

        self.check_method(&method)
    }

    /// Resolves the `Access-Control-Allow-Headers` value for a pre-flight request.
    ///
    /// Returns `None` when no headers were requested. With `*` the requested list is echoed
    /// as-is. Otherwise only the requested headers that are allowed are returned, and the
    /// pre-flight fails when none of them are.
    pub(crate) fn check_headers(
        &self,
        requested: Option<&HeaderValue>,
    ) -> Result<Option<HeaderValue>, CorsError> {
        let requested = match requested {
            Some(hdr) if !is_blank_list(hdr.as_bytes()) => hdr,
            _ => return Ok(None),
        };

        #[allow(clippy::mutable_key_type)]
        let allowed = match &self.allowed_headers {
            AllOrSome::All => return Ok(Some(requested.clone())),
            AllOrSome::Some(allowed) => allowed,
        };

        let list = requested.to_str().map_err(|_| CorsError::BadRequestHeaders)?;

        let granted = list
            .split(',')
            .map(str::trim)
            .filter(|name| {
                HeaderName::try_from(*name).map_or(false, |name| allowed.contains(&name))
            })
            .collect::<Vec<_>>();

        if granted.is_empty() {
            return Err(CorsError::HeadersNotAllowed);
        }

        HeaderValue::try_from(granted.join(", "))
            .map(Some)
            .map_err(|_| CorsError::BadRequestHeaders)
    }
}

/// Builder for [`CorsPolicy`].
///
/// Values are given as strings so they can come straight from configuration; `"*"` means "any"
/// for origins, methods, headers and exposed headers. The first invalid value is remembered and
/// returned from [`build`](Self::build).
///
/// # Example
/// ```
/// use actix_cors_filter::CorsPolicy;
///
/// let policy = CorsPolicy::builder()
///     .allowed_origin("http://localhost:5173")
///     .allowed_origin_pattern("https://*.example.com")
///     .allowed_methods(["GET", "POST"])
///     .allowed_header("Content-Type")
///     .allow_credentials(true)
///     .max_age(1800)
///     .build()
///     .unwrap();
///
/// assert!(policy.allows_credentials());
/// ```
#[derive(Debug, Default)]
pub struct CorsPolicyBuilder {
    origins: Vec<String>,
    origin_patterns: Vec<OriginPattern>,
    methods: Option<Vec<String>>,
    headers: Vec<String>,
    exposed_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<u64>,
    error: Option<CorsError>,
}

impl CorsPolicyBuilder {
    /// Adds an exact origin, e.g. `https://app.example.com`. `"*"` allows any origin but cannot
    /// be combined with credentials; use [`allowed_origin_pattern`](Self::allowed_origin_pattern)
    /// for that.
    pub fn allowed_origin(mut self, origin: impl AsRef<str>) -> Self {
        self.origins.push(origin.as_ref().to_owned());
        self
    }

    /// Adds an origin pattern. See [`OriginPattern`] for the syntax.
    pub fn allowed_origin_pattern(mut self, pattern: impl AsRef<str>) -> Self {
        match OriginPattern::new(pattern.as_ref()) {
            Ok(pattern) => self.origin_patterns.push(pattern),
            Err(err) => self.record(err),
        }

        self
    }

    /// Adds an allowed method. Defaults to `GET, HEAD, POST` if no method is ever added.
    pub fn allowed_method(mut self, method: impl AsRef<str>) -> Self {
        self.methods
            .get_or_insert_with(Vec::new)
            .push(method.as_ref().to_owned());
        self
    }

    /// Adds several allowed methods.
    pub fn allowed_methods<I, M>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        methods
            .into_iter()
            .fold(self, |this, method| this.allowed_method(method))
    }

    /// Adds a request header that pre-flight requests may ask for.
    pub fn allowed_header(mut self, header: impl AsRef<str>) -> Self {
        self.headers.push(header.as_ref().to_owned());
        self
    }

    /// Adds several allowed request headers.
    pub fn allowed_headers<I, H>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: AsRef<str>,
    {
        headers
            .into_iter()
            .fold(self, |this, header| this.allowed_header(header))
    }

    /// Adds a response header that scripts on the calling origin may read.
    pub fn exposed_header(mut self, header: impl AsRef<str>) -> Self {
        self.exposed_headers.push(header.as_ref().to_owned());
        self
    }

    /// Adds several exposed response headers.
    pub fn exposed_headers<I, H>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: AsRef<str>,
    {
        headers
            .into_iter()
            .fold(self, |this, header| this.exposed_header(header))
    }

    /// Whether cookies and `Authorization` headers may accompany cross-origin requests.
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// How long, in seconds, browsers may cache a pre-flight response.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn record(&mut self, err: CorsError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Validates the configuration and produces the policy.
    pub fn build(self) -> Result<CorsPolicy, CorsError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let allowed_origins = if self.origins.iter().any(|origin| origin.trim() == "*") {
            if self.allow_credentials {
                return Err(CorsError::CredentialsWithWildcardOrigin);
            }

            AllOrSome::All
        } else {
            AllOrSome::Some(
                self.origins
                    .iter()
                    .map(|origin| normalize_origin(origin))
                    .collect(),
            )
        };

        let allowed_methods = match self.methods {
            None => AllOrSome::Some(DEFAULT_METHODS.iter().cloned().collect()),
            Some(methods) if methods.iter().any(|m| m.trim() == "*") => AllOrSome::All,
            Some(methods) => AllOrSome::Some(
                methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.trim().as_bytes())
                            .map_err(|_| CorsError::InvalidMethod(m.clone()))
                    })
                    .collect::<Result<HashSet<_>, _>>()?,
            ),
        };

        let allowed_methods_baked = match &allowed_methods {
            AllOrSome::All => None,
            AllOrSome::Some(methods) => Some(intersperse_header_values(
                methods.iter().map(Method::as_str),
            )),
        };

        let allowed_headers = if self.headers.iter().any(|h| h.trim() == "*") {
            AllOrSome::All
        } else {
            AllOrSome::Some(parse_header_names(&self.headers)?)
        };

        let exposed_headers_baked = if self.exposed_headers.iter().any(|h| h.trim() == "*") {
            if self.allow_credentials {
                return Err(CorsError::CredentialsWithWildcardExposedHeaders);
            }

            Some(HeaderValue::from_static("*"))
        } else {
            #[allow(clippy::mutable_key_type)]
            let exposed = parse_header_names(&self.exposed_headers)?;

            if exposed.is_empty() {
                None
            } else {
                Some(intersperse_header_values(
                    exposed.iter().map(HeaderName::as_str),
                ))
            }
        };

        log::trace!(
            "built CORS policy; origins: {:?}, patterns: {:?}, credentials: {}",
            allowed_origins,
            self.origin_patterns,
            self.allow_credentials
        );

        Ok(CorsPolicy {
            allowed_origins,
            allowed_origin_patterns: self.origin_patterns,
            allowed_methods,
            allowed_methods_baked,
            allowed_headers,
            exposed_headers_baked,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        })
    }
}

#[allow(clippy::mutable_key_type)]
fn parse_header_names(names: &[String]) -> Result<HashSet<HeaderName>, CorsError> {
    names
        .iter()
        .map(|name| {
            HeaderName::try_from(name.trim()).map_err(|_| CorsError::InvalidHeaderName(name.clone()))
        })
        .collect()
}

/// Returns true if a comma-separated header list holds no names at all.
fn is_blank_list(list: &[u8]) -> bool {
    list.iter().all(|&b| b == b',' || b.is_ascii_whitespace())
}

/// Lower-cases an origin and strips a trailing slash for comparison.
fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Sorts and joins values into a single comma-separated header value.
fn intersperse_header_values<'a>(values: impl Iterator<Item = &'a str>) -> HeaderValue {
    let mut values = values.collect::<Vec<_>>();
    values.sort_unstable();

    HeaderValue::try_from(values.join(", "))
        .expect("method and header names are always valid header values")
}
