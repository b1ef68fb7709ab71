use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use judge_engine::config::WorkerConfig;
use judge_engine::http;
use judge_engine::infra::queue::RedisQueue;
use judge_engine::jobs::evaluation::Evaluator;
use judge_engine::jobs::Worker;
use judge_engine::languages::LanguageTable;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("judge_engine=info".parse()?),
        )
        .init();

    let config = WorkerConfig::from_env();
    info!("Starting Judge Worker...");

    // Load language configurations
    let languages = match &config.languages_config {
        Some(path) => {
            let table = LanguageTable::load(path)?;
            info!("Loaded language configurations from {}", path.display());
            table
        }
        None => LanguageTable::builtin()?,
    };
    let supported: Vec<&str> = languages.supported().iter().map(|l| l.name()).collect();
    info!("Supported languages: {}", supported.join(", "));

    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .with_context(|| format!("cannot create scratch dir {}", config.scratch_dir.display()))?;

    let evaluator = Arc::new(Evaluator::new(
        Arc::new(languages),
        &config.scratch_dir,
        config.limits.clone(),
    ));

    if let Some(addr) = &config.http_addr {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind HTTP listener on {}", addr))?;
        info!("HTTP server listening on {}", addr);
        let app = http::router(evaluator.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server stopped: {}", e);
            }
        });
    }

    let queue = RedisQueue::connect(&config.redis_url, config.retry_backoff)
        .await
        .context("cannot open Redis client")?;
    let worker = Worker::new(Arc::new(queue), evaluator, &config);

    tokio::select! {
        _ = worker.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("cannot listen for shutdown signal")?;
            info!("Shutdown signal received, stopping worker");
        }
    }

    Ok(())
}
