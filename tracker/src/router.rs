use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::{EventStore, MailRegistry};
use crate::summary::Summarizer;
use crate::time::TimeSource;
use crate::{emails, pixel, summary};

#[derive(Clone)]
pub struct State {
    pub events: Arc<dyn EventStore + Send + Sync>,
    pub registry: Arc<dyn MailRegistry + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub summarizer: Arc<Summarizer>,
    pub append_timeout: Duration,
}

async fn index() -> &'static str {
    "tracker"
}

pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    E: EventStore + Send + Sync + 'static,
    R: MailRegistry + Send + Sync + 'static,
>(
    timesource: TZ,
    events: E,
    registry: R,
    summarizer: Summarizer,
    append_timeout: Duration,
    metrics: bool,
) -> Router {
    let state = State {
        events: Arc::new(events),
        registry: Arc::new(registry),
        timesource: Arc::new(timesource),
        summarizer: Arc::new(summarizer),
        append_timeout,
    };

    // Permissive CORS: the dashboard origin varies per deployment and the
    // pixel is fetched by whatever proxy the mail client puts in front.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    // The /api-prefixed aliases are the paths the published extension and
    // dashboard already call; the bare paths are the canonical ones.
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(index))
        .route("/open", get(pixel::open))
        .route("/api/open", get(pixel::open))
        .route("/extension/email-sent", post(emails::email_sent))
        .route("/api/extension/email-sent", post(emails::email_sent))
        .route("/emails/sent", get(emails::sent_emails))
        .route("/api/emails/sent", get(emails::sent_emails))
        .route("/emails/:tracking_id/summarize", post(summary::summarize))
        .route(
            "/api/emails/:tracking_id/summarize",
            post(summary::summarize),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when tracker is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
