use dotenv::dotenv;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripsync::app;
use tripsync::config::get_config;
use tripsync::modules::Modules;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tripsync=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = get_config().expect("Failed to load configuration");
    let modules = Modules::load_from_settings(settings).await;
    let addr = modules.addr;

    info!("Starting server");
    info!("Listening on {addr}");
    axum::Server::bind(&addr)
        .serve(
            app(modules)
                .await
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Failed to run axum server");
}
