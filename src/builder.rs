use std::rc::Rc;

use actix_utils::future::{self, Ready};
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};

use crate::{CorsFilterMiddleware, CorsPolicy, CorsSettings, PolicySource, SettingsError};

/// Path-scoped Cross-Origin Resource Sharing middleware.
///
/// Every request whose path matches a registration in the [`PolicySource`] is checked against
/// that registration's [`CorsPolicy`]: pre-flight requests are answered directly and actual
/// requests are forwarded and then decorated with CORS response headers. Requests without an
/// `Origin` header, same-origin requests and requests matching no registration pass through
/// untouched.
///
/// # Example
/// ```
/// use actix_cors_filter::{CorsFilter, CorsPolicy, PolicySource};
/// use actix_web::{web, App};
///
/// let source = PolicySource::new()
///     .with(
///         "/admin/**",
///         CorsPolicy::builder()
///             .allowed_origin("https://admin.example.com")
///             .allow_credentials(true)
///             .build()
///             .unwrap(),
///     )
///     .unwrap()
///     .with("/**", CorsPolicy::permissive())
///     .unwrap();
///
/// let app = App::new()
///     .wrap(CorsFilter::new(source))
///     .default_service(web::to(|| async { "Hello, cross-origin world!" }));
/// ```
#[derive(Debug, Clone)]
pub struct CorsFilter {
    source: Rc<PolicySource>,
}

impl CorsFilter {
    /// Wraps the given registrations.
    pub fn new(source: PolicySource) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    /// Applies [`CorsPolicy::permissive()`] to every route: any origin (echoed back), any
    /// method, any header, credentials allowed.
    pub fn permissive() -> Self {
        Self::new(PolicySource::permissive())
    }

    /// Applies a single policy to every route.
    pub fn for_all_routes(policy: CorsPolicy) -> Self {
        let mut source = PolicySource::new();

        source
            .register("/**", policy)
            .expect("`/**` is a valid path pattern");

        Self::new(source)
    }

    /// Validates settings and wraps the resulting registrations.
    pub fn from_settings(settings: CorsSettings) -> Result<Self, SettingsError> {
        settings.into_source().map(Self::new)
    }

    /// Returns the registrations applied by this middleware.
    pub fn source(&self) -> &PolicySource {
        &self.source
    }
}

impl From<PolicySource> for CorsFilter {
    fn from(source: PolicySource) -> Self {
        Self::new(source)
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,

    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsFilterMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        future::ok(CorsFilterMiddleware {
            service,
            source: Rc::clone(&self.source),
        })
    }
}

#[cfg(test)]
mod test {
    use actix_web::{
        http::{header, StatusCode},
        test::{self, TestRequest},
    };

    use super::*;

    #[actix_web::test]
    async fn permissive_echoes_origin() {
        let cors = CorsFilter::permissive()
            .new_transform(test::ok_service())
            .await
            .unwrap();

        let req = TestRequest::get()
            .insert_header((header::ORIGIN, "https://www.example.com"))
            .to_srv_request();

        let res = test::call_service(&cors, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://www.example.com"
        );
    }

    #[test]
    fn settings_errors_propagate() {
        let settings = CorsSettings::from_template(
            r#"
            [[mapping]]
            path = "/**"
            allowed-origin-patterns = ["http://localhost:[x]"]
            "#,
        )
        .unwrap();

        assert!(CorsFilter::from_settings(settings).is_err());
        assert_eq!(
            CorsFilter::from_settings(CorsSettings::from_default_template())
                .unwrap()
                .source(),
            CorsFilter::permissive().source()
        );
    }

    #[test]
    fn single_policy_covers_everything() {
        let cors = CorsFilter::for_all_routes(CorsPolicy::permissive());
        assert_eq!(cors.source(), &PolicySource::permissive());
    }
}
