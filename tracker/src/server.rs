use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PostgresStore;
use crate::summary::Summarizer;
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let summarizer = Summarizer::new(
        config.summarizer_url,
        config.huggingface_api_key,
        Duration::from_secs(config.summarize_timeout_secs),
    )
    .expect("failed to create summarizer client");

    let append_timeout = Duration::from_millis(config.append_timeout_ms);

    let app = if config.memory_store {
        let store = MemoryStore::default();
        router::router(
            SystemTime {},
            store.clone(),
            store,
            summarizer,
            append_timeout,
            config.export_prometheus,
        )
    } else {
        let store = PostgresStore::new(&config.database_url, config.max_pg_connections)
            .await
            .expect("failed to connect to postgres");
        router::router(
            SystemTime {},
            store.clone(),
            store,
            summarizer,
            append_timeout,
            config.export_prometheus,
        )
    };

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .unwrap()
}
