use std::rc::Rc;

use actix_utils::future::ok;
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse},
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method,
    },
    Error, HttpResponse, Result,
};
use futures_util::future::{FutureExt as _, LocalBoxFuture};
use log::{debug, trace};

use crate::{CorsError, CorsPolicy, PolicySource};

const VARY_VALUE: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

/// Service wrapper applying path-scoped CORS policies.
///
/// Created by [`CorsFilter`](crate::CorsFilter); not meant to be constructed directly.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct CorsFilterMiddleware<S> {
    pub(crate) service: S,
    pub(crate) source: Rc<PolicySource>,
}

impl<S> CorsFilterMiddleware<S> {
    /// Answers a pre-flight request without involving the wrapped service.
    fn handle_preflight(
        policy: &CorsPolicy,
        req: ServiceRequest,
        origin: &HeaderValue,
    ) -> ServiceResponse {
        let headers = req.headers();

        let checked = headers
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .ok_or(CorsError::BadRequestMethod)
            .and_then(|requested_method| {
                let allow_origin = policy.check_origin(origin)?;
                let allow_methods = policy.check_requested_method(requested_method)?;
                let allow_headers =
                    policy.check_headers(headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS))?;

                Ok((allow_origin, allow_methods, allow_headers))
            });

        let (allow_origin, allow_methods, allow_headers) = match checked {
            Ok(checked) => checked,
            Err(err) => return Self::reject(req, err),
        };

        let mut res = HttpResponse::Ok();

        res.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin));
        res.insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, allow_methods));

        if let Some(headers) = allow_headers {
            res.insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, headers));
        }

        if policy.allow_credentials {
            res.insert_header((
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            ));
        }

        if let Some(max_age) = policy.max_age {
            res.insert_header((header::ACCESS_CONTROL_MAX_AGE, max_age.to_string()));
        }

        res.insert_header((header::VARY, HeaderValue::from_static(VARY_VALUE)));

        req.into_response(res.finish())
    }

    fn reject(req: ServiceRequest, err: CorsError) -> ServiceResponse {
        debug!(
            "rejected CORS request to {} {}: {}; inner service is not called",
            req.method(),
            req.path(),
            err
        );

        let mut res = req.error_response(err);
        res.headers_mut()
            .insert(header::VARY, HeaderValue::from_static(VARY_VALUE));
        res
    }

    fn augment_response<B>(
        decoration: Decoration,
        mut res: ServiceResponse<B>,
    ) -> ServiceResponse<B> {
        let headers = res.headers_mut();
        append_vary(headers);

        if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            trace!("response already carries CORS headers; leaving them as-is");
            return res;
        }

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, decoration.allow_origin);

        if let Some(expose) = decoration.expose_headers {
            trace!("exposing selected headers: {:?}", expose);
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose);
        }

        if decoration.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        res
    }
}

/// Response headers decided before an actual request is forwarded.
struct Decoration {
    allow_origin: HeaderValue,
    expose_headers: Option<HeaderValue>,
    allow_credentials: bool,
}

impl<S, B> Service<ServiceRequest> for CorsFilterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,

    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<EitherBody<B>>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let source = Rc::clone(&self.source);

        let policy = match source.policy_for(req.path()) {
            Some(policy) => policy,
            None => return self.forward(req),
        };

        // requests without an `Origin` header are not cross-origin requests
        let origin = match req.headers().get(header::ORIGIN).cloned() {
            Some(origin) => origin,
            None => return self.forward(req),
        };

        if is_same_origin(&req, &origin) {
            trace!("same-origin request to {}; skipping CORS processing", req.path());
            return self.forward(req);
        }

        if is_preflight(&req) {
            let res = Self::handle_preflight(policy, req, &origin);
            return ok(res.map_into_right_body()).boxed_local();
        }

        let checked = policy
            .check_origin(&origin)
            .and_then(|allow_origin| policy.check_method(req.method()).map(|_| allow_origin));

        let allow_origin = match checked {
            Ok(allow_origin) => allow_origin,
            Err(err) => return ok(Self::reject(req, err).map_into_right_body()).boxed_local(),
        };

        let decoration = Decoration {
            allow_origin,
            expose_headers: policy.exposed_headers_baked.clone(),
            allow_credentials: policy.allow_credentials,
        };

        let fut = self.service.call(req);

        async move {
            let res = fut.await?;
            Ok(Self::augment_response(decoration, res).map_into_left_body())
        }
        .boxed_local()
    }
}

impl<S, B> CorsFilterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    /// Calls the wrapped service without CORS processing.
    fn forward(
        &self,
        req: ServiceRequest,
    ) -> LocalBoxFuture<'static, Result<ServiceResponse<EitherBody<B>>, Error>> {
        let fut = self.service.call(req);
        async move { fut.await.map(ServiceResponse::map_into_left_body) }.boxed_local()
    }
}

/// Pre-flight requests are `OPTIONS` requests carrying both `Origin` and
/// `Access-Control-Request-Method`.
fn is_preflight(req: &ServiceRequest) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ORIGIN)
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Compares `Origin` with the scheme and host the request was addressed to.
fn is_same_origin(req: &ServiceRequest, origin: &HeaderValue) -> bool {
    let origin = match origin.to_str() {
        Ok(origin) => origin,
        Err(_) => return false,
    };

    let conn = req.connection_info();
    let scheme = conn.scheme();
    let own = format!("{}://{}", scheme, conn.host());

    strip_default_port(origin.trim_end_matches('/'), scheme)
        .eq_ignore_ascii_case(strip_default_port(&own, scheme))
}

fn strip_default_port<'a>(origin: &'a str, scheme: &str) -> &'a str {
    let default_port = match scheme {
        "http" => ":80",
        "https" => ":443",
        _ => return origin,
    };

    origin.strip_suffix(default_port).unwrap_or(origin)
}

/// Adds the CORS request headers to `Vary`, keeping any existing value.
fn append_vary(headers: &mut HeaderMap) {
    let value = match headers.get(header::VARY) {
        Some(hdr) => {
            let mut val: Vec<u8> = Vec::with_capacity(hdr.len() + 2 + VARY_VALUE.len());
            val.extend(hdr.as_bytes());
            val.extend(b", ");
            val.extend(VARY_VALUE.as_bytes());

            match HeaderValue::from_bytes(&val) {
                Ok(value) => value,
                Err(_) => return,
            }
        }
        None => HeaderValue::from_static(VARY_VALUE),
    };

    headers.insert(header::VARY, value);
}

#[cfg(test)]
mod tests {
    use actix_web::{
        dev::Transform,
        test::{self, TestRequest},
    };

    use super::*;
    use crate::CorsFilter;

    #[actix_web::test]
    async fn non_preflight_options_is_forwarded() {
        let cors = CorsFilter::permissive()
            .new_transform(test::ok_service())
            .await
            .unwrap();

        // no Access-Control-Request-Method: treated as an actual request
        let req = TestRequest::default()
            .method(Method::OPTIONS)
            .insert_header((header::ORIGIN, "https://app.example.com"))
            .to_srv_request();
        assert!(!is_preflight(&req));

        let res = test::call_service(&cors, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::OK);
        assert_eq!(
            res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert!(res
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .is_none());
    }

    #[actix_web::test]
    async fn same_origin_is_not_decorated() {
        let cors = CorsFilter::permissive()
            .new_transform(test::ok_service())
            .await
            .unwrap();

        let req = TestRequest::get()
            .insert_header((header::HOST, "api.example.com"))
            .insert_header((header::ORIGIN, "http://api.example.com:80"))
            .to_srv_request();
        assert!(is_same_origin(
            &req,
            req.headers().get(header::ORIGIN).unwrap()
        ));

        let res = test::call_service(&cors, req).await;
        assert!(res
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        assert!(res.headers().get(header::VARY).is_none());
    }

    #[test]
    fn vary_is_appended() {
        let mut headers = HeaderMap::new();
        append_vary(&mut headers);
        assert_eq!(headers.get(header::VARY).unwrap(), VARY_VALUE);

        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        append_vary(&mut headers);
        assert_eq!(
            headers.get(header::VARY).unwrap(),
            "Accept-Encoding, Origin, Access-Control-Request-Method, Access-Control-Request-Headers"
        );
    }

    #[test]
    fn default_ports_are_ignored() {
        assert_eq!(strip_default_port("https://a.com:443", "https"), "https://a.com");
        assert_eq!(strip_default_port("https://a.com:8443", "https"), "https://a.com:8443");
        assert_eq!(strip_default_port("http://a.com:80", "http"), "http://a.com");
    }
}
