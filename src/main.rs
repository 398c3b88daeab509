use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

use storefront_checkout as api;

use api::clients::{
    build_http_client, HttpCouponResolver, HttpGiftCardLedger, HttpOrderGateway,
    HttpPaymentProvider,
};
use api::sessions::{Boundaries, CheckoutSessions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let storefront = Arc::new(cfg.storefront.clone());

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Shared HTTP client for the boundary services
    let http = build_http_client(storefront.http_timeout_secs)?;
    let boundaries = Boundaries {
        coupons: Arc::new(HttpCouponResolver::new(
            http.clone(),
            storefront.coupon_service_url.clone(),
        )),
        gift_cards: Arc::new(HttpGiftCardLedger::new(
            http.clone(),
            storefront.gift_card_service_url.clone(),
            storefront.api_key.clone(),
        )),
        orders: Arc::new(HttpOrderGateway::new(
            http.clone(),
            storefront.order_service_url.clone(),
            storefront.api_key.clone(),
        )),
        provider: Arc::new(HttpPaymentProvider::new(
            http,
            storefront.payment_provider_url.clone(),
        )),
    };

    let sessions = Arc::new(CheckoutSessions::new(
        boundaries,
        event_sender.clone(),
        storefront.clone(),
    ));

    let state = Arc::new(api::AppState {
        config: storefront,
        event_sender,
        sessions,
    });

    let app = Router::new()
        .route("/", get(|| async { "storefront-checkout up" }))
        .nest("/api/v1", api::api_v1_routes())
        .layer(axum::middleware::from_fn(api::request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = cfg
        .server_addr()
        .parse()
        .context("invalid server address")?;
    info!("storefront-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server address")?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
