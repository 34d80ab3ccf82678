use std::sync::Arc;
use std::time::Duration;

use pipeline::config::Config;
use pipeline::context::AppContext;
use pipeline::workers;
use types::{
    QUEUE_ANALYZE, QUEUE_ASSEMBLE, QUEUE_CRAWL, QUEUE_DELIVER, QUEUE_NARRATE,
    QUEUE_PIPELINE, QUEUE_TRANSCRIBE,
};

const CRON_PERIOD: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let context: AppContext =
        pd_app::create_app_context_from::<AppContext, Config>(pipeline::config::figment())
            .await
            .expect("failed to load config");
    let context = Arc::new(context);

    let pools = [
        (QUEUE_CRAWL, context.config.crawl_workers),
        (QUEUE_TRANSCRIBE, context.config.transcribe_workers),
        (QUEUE_ANALYZE, context.config.analyze_workers),
        (QUEUE_NARRATE, context.config.narrate_workers),
        (QUEUE_ASSEMBLE, context.config.assemble_workers),
        (QUEUE_DELIVER, context.config.deliver_workers),
        (QUEUE_PIPELINE, context.config.pipeline_workers),
    ];

    let mut handles = Vec::new();

    for (queue, count) in pools {
        for _ in 0..count {
            handles.push(tokio::spawn(workers::run_worker(context.clone(), queue)));
        }
    }

    // hourly scheduler tick; the tick id dedups across processes
    let cron_context = context.clone();
    handles.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(CRON_PERIOD);
        loop {
            interval.tick().await;

            let tick_id = queue_broker::cron_tick_id(chrono::Utc::now());
            if let Err(e) = cron_context
                .broker
                .enqueue(QUEUE_PIPELINE, &tick_id, &serde_json::json!({}))
                .await
            {
                tracing::error!("failed to enqueue scheduler tick: {}", e);
            }
        }
    }));

    tracing::info!("pipeline worker started with {} tasks", handles.len());

    shutdown_signal().await;

    tracing::warn!("signal received, starting graceful shutdown");

    for handle in &handles {
        handle.abort();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
