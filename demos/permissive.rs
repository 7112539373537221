use actix_cors_filter::{CorsFilter, CorsSettings};
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};

async fn list_users() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"[{"id":1,"name":"Ada"}]"#)
}

async fn create_user(body: web::Bytes) -> HttpResponse {
    HttpResponse::Created()
        .content_type("application/json")
        .body(body)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // writes the permissive template on first run
    let mut settings = CorsSettings::parse_toml("./Cors.toml")
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    // e.g. CORS__ALLOWED_ORIGINS="http://localhost:5173,https://yourdomain.com"
    settings
        .override_allowed_origins_with_env_var("CORS__ALLOWED_ORIGINS")
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    let source = settings
        .into_source()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    log::info!("starting HTTP server at http://localhost:8080");

    HttpServer::new(move || {
        App::new()
            .wrap(CorsFilter::new(source.clone()))
            .wrap(Logger::default())
            .route("/api/users", web::get().to(list_users))
            .route("/api/users", web::post().to(create_user))
            .default_service(web::to(|| async { "Hello, cross-origin world!" }))
    })
    .workers(1)
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
