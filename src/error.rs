use std::{env::VarError, io, path::PathBuf};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use derive_more::derive::{Display, Error};
use toml::de::Error as TomlError;

/// Errors that can occur when building CORS policies or processing CORS guarded requests.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[non_exhaustive]
pub enum CorsError {
    /// Allowed origins contain the literal wildcard (`*`) while credentials are allowed.
    #[display(
        "credentials are allowed but `allowed_origins` contains \"*\"; \
         use an origin pattern or list the origins explicitly"
    )]
    CredentialsWithWildcardOrigin,

    /// Exposed headers contain the wildcard (`*`) while credentials are allowed.
    #[display("credentials are allowed but `exposed_headers` contains \"*\"")]
    CredentialsWithWildcardExposedHeaders,

    /// Origin pattern could not be parsed.
    #[display("invalid origin pattern: {_0}")]
    InvalidOriginPattern(#[error(not(source))] String),

    /// Path pattern could not be parsed.
    #[display("invalid path pattern: {_0}")]
    InvalidPathPattern(#[error(not(source))] String),

    /// Configured header name is not a valid HTTP header name.
    #[display("invalid header name: {_0}")]
    InvalidHeaderName(#[error(not(source))] String),

    /// Configured method is not a valid HTTP method.
    #[display("invalid method: {_0}")]
    InvalidMethod(#[error(not(source))] String),

    /// Request header `Origin` has an invalid value.
    #[display("Request header `Origin` has an invalid value")]
    BadOrigin,

    /// Request header `Access-Control-Request-Method` has an invalid value.
    #[display("Request header `Access-Control-Request-Method` has an invalid value")]
    BadRequestMethod,

    /// Request header `Access-Control-Request-Headers` has an invalid value.
    #[display("Request header `Access-Control-Request-Headers` has an invalid value")]
    BadRequestHeaders,

    /// Origin is not allowed to make this request.
    #[display("Origin is not allowed to make this request")]
    OriginNotAllowed,

    /// Request method is not allowed.
    #[display("Requested method is not allowed")]
    MethodNotAllowed,

    /// One or more request headers are not allowed.
    #[display("One or more request headers are not allowed")]
    HeadersNotAllowed,
}

impl CorsError {
    /// Returns true for errors produced while processing a request, as opposed to
    /// misconfiguration detected while building a policy.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            CorsError::BadOrigin
                | CorsError::BadRequestMethod
                | CorsError::BadRequestHeaders
                | CorsError::OriginNotAllowed
                | CorsError::MethodNotAllowed
                | CorsError::HeadersNotAllowed
        )
    }
}

impl ResponseError for CorsError {
    fn status_code(&self) -> StatusCode {
        if self.is_request_error() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    // the reason is only logged; clients get a fixed body
    fn error_response(&self) -> HttpResponse {
        HttpResponse::with_body(self.status_code(), "Invalid CORS request").map_into_boxed_body()
    }
}

/// Errors that can occur while loading [`CorsSettings`](crate::CorsSettings).
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum SettingsError {
    /// Environment variable is not valid unicode.
    #[display("Env var error: {_0}")]
    EnvVarError(VarError),

    /// File already exists on disk.
    #[display("File exists: {}", _0.display())]
    FileExists(#[error(not(source))] PathBuf),

    /// I/O error.
    #[display("I/O error: {_0}")]
    IoError(io::Error),

    /// Error deserializing as TOML.
    #[display("TOML error: {_0}")]
    TomlError(TomlError),

    /// A configured policy or path pattern is invalid.
    #[display("CORS configuration error: {_0}")]
    Cors(CorsError),
}

impl From<VarError> for SettingsError {
    fn from(err: VarError) -> Self {
        Self::EnvVarError(err)
    }
}

impl From<io::Error> for SettingsError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<TomlError> for SettingsError {
    fn from(err: TomlError) -> Self {
        Self::TomlError(err)
    }
}

impl From<CorsError> for SettingsError {
    fn from(err: CorsError) -> Self {
        Self::Cors(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_are_forbidden() {
        let res = CorsError::OriginNotAllowed.error_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = CorsError::CredentialsWithWildcardOrigin.error_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn display_carries_offending_value() {
        let err = CorsError::InvalidOriginPattern("https://[".to_owned());
        assert_eq!(err.to_string(), "invalid origin pattern: https://[");
    }
}
