//! Path-scoped Cross-Origin Resource Sharing (CORS) policy filter for Actix Web.
//!
//! Policies are registered against Ant-style path patterns on a [`PolicySource`]; the first
//! matching registration decides how a request is treated. Once built, a [`CorsFilter`] can be
//! used as an argument for Actix Web's `App::wrap()`, `Scope::wrap()`, or `Resource::wrap()`
//! methods.
//!
//! The filter automatically answers `OPTIONS` pre-flight requests and never forwards them.
//!
//! [`CorsFilter::permissive()`] reproduces the common "allow everything" set-up: any origin, any
//! method, any header, credentials allowed, on every path. Because credentials are allowed, the
//! request `Origin` is echoed in `Access-Control-Allow-Origin` instead of `*`, which browsers
//! would reject.
//!
//! # Example
//! ```no_run
//! use actix_cors_filter::{CorsFilter, CorsSettings};
//! use actix_web::{get, App, HttpServer};
//!
//! #[get("/api/users")]
//! async fn users() -> &'static str {
//!     "[]"
//! }
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let settings = CorsSettings::parse_toml("./Cors.toml")
//!         .expect("Failed to parse `CorsSettings` from Cors.toml");
//!     let source = settings.into_source().expect("invalid CORS settings");
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(CorsFilter::new(source.clone()))
//!             .service(users)
//!     })
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, nonstandard_style)]
#![warn(future_incompatible, missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod all_or_some;
mod builder;
mod error;
mod middleware;
mod pattern;
mod policy;
mod settings;
mod source;

pub use self::{
    all_or_some::AllOrSome,
    builder::CorsFilter,
    error::{CorsError, SettingsError},
    middleware::CorsFilterMiddleware,
    pattern::{OriginPattern, PathPattern},
    policy::{CorsPolicy, CorsPolicyBuilder},
    settings::{CorsSettings, PolicyMapping},
    source::PolicySource,
};
