pub mod domain;
pub mod handlers;
pub mod routes;
pub mod shared;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::middleware::{self, Next};
    use axum::response::Response;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tower_http::cors::{Any, CorsLayer};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // Создаем директорию для логов
    let log_dir = std::path::Path::new("target").join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file_path = log_dir.join("backend.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                // Отключаем логи SQL запросов, но оставляем логи приложения
                "info,sqlx=warn,sea_orm=warn".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Arc::new(log_file))
                .with_ansi(false),
        )
        .init();

    // Простой middleware для логирования запросов
    async fn request_logger(req: Request<Body>, next: Next) -> Response {
        let start = std::time::Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();

        let response = next.run(req).await;

        let duration = start.elapsed();
        let status = response.status().as_u16();
        // Голубой для успешных ответов, коричневый для остальных
        let color_code = if response.status().is_success() {
            "36"
        } else {
            "33"
        };

        println!(
            "\x1b[{}m{}\x1b[0m | {:>5}ms | {} {:>6} {}",
            color_code,
            chrono::Utc::now().format("%H:%M:%S"),
            duration.as_millis(),
            status,
            method,
            uri.path()
        );

        response
    }

    let config = shared::config::load_config()?;
    let db_path = shared::config::get_database_path(&config)?;

    shared::data::db::initialize_database(db_path.to_str())
        .await
        .map_err(|e| anyhow::anyhow!("db init failed: {e}"))?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = routes::configure_routes()
        .layer(middleware::from_fn(request_logger))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!("Attempting to bind server to http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("Server successfully bound to {}", addr);
            listener
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Error: Port {} is already in use. Please ensure no other process is using this port.",
                    config.server.port
                );
            } else {
                tracing::error!("Failed to bind to port {}. Error: {}", config.server.port, e);
            }
            // Propagate the error to stop the application
            return Err(e.into());
        }
    };

    axum::serve(listener, app).await?;

    Ok(())
}
