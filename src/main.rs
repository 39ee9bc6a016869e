use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod model;
mod models;
mod routes;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::engine::aggregator;
use crate::engine::encoder::HttpFaceEncoder;
use crate::utils::enrollment_filter;
use crate::utils::gallery_cache;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance engine up"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;
    let encoder = HttpFaceEncoder::new(&config.encoder_url);

    let pool_for_filter_warmup = pool.clone();
    let pool_for_gallery_warmup = pool.clone();
    let pool_for_scheduler = pool.clone();
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();
    let config_for_scheduler = config.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) =
            enrollment_filter::warmup_enrollment_filter(&pool_for_filter_warmup, 500).await
        {
            eprintln!("Failed to warmup enrollment filter: {:?}", e);
        }
    });

    actix_web::rt::spawn(async move {
        // Warm galleries for members who scanned in the last 7 days
        if let Err(e) = gallery_cache::warmup_gallery_cache(&pool_for_gallery_warmup, 7, 250).await
        {
            eprintln!("Failed to warmup gallery cache: {:?}", e);
        }
    });

    // Per-shift computation ticks, driven by each shift's computation_time
    actix_web::rt::spawn(async move {
        aggregator::run_scheduler(pool_for_scheduler, config_for_scheduler).await;
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(encoder.clone()))
            .service(index)
            // Configure kiosk + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
