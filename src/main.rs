use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use triage_core::config::{
    data_dir_from_env_value, passphrase_from_env_value, rules_file_from_env_value,
    session_timeout_from_env_value,
};
use triage_core::{CoreConfig, MessageCipher, MessagePipeline, RuleEngine};

/// How often timed-out sessions are purged from memory.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Main entry point for the triage service
///
/// Resolves configuration from the environment (and `.env`), derives the message key, then
/// serves the REST API until the process is stopped.
///
/// # Environment Variables
/// - `TRIAGE_DATA_DIR`: Root of patient histories and audit trails (default: "triage_data")
/// - `TRIAGE_SESSION_TIMEOUT_SECS`: Session lifetime in seconds (default: 3600)
/// - `TRIAGE_ENCRYPTION_PASSPHRASE`: Key-derivation passphrase (required, at least 12 characters)
/// - `TRIAGE_RULES_FILE`: Optional YAML rule table replacing the built-in rules
/// - `TRIAGE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
///
/// # Errors
/// Returns an error if configuration is missing or invalid, the server address cannot be bound,
/// or the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("triage=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = data_dir_from_env_value(std::env::var("TRIAGE_DATA_DIR").ok());
    let session_timeout =
        session_timeout_from_env_value(std::env::var("TRIAGE_SESSION_TIMEOUT_SECS").ok())?;
    let passphrase =
        passphrase_from_env_value(std::env::var("TRIAGE_ENCRYPTION_PASSPHRASE").ok())?;
    let rules = match rules_file_from_env_value(std::env::var("TRIAGE_RULES_FILE").ok()) {
        Some(path) => {
            tracing::info!("++ Loading triage rules from {}", path.display());
            RuleEngine::from_yaml_file(&path)?
        }
        None => RuleEngine::default(),
    };
    let rest_addr = std::env::var("TRIAGE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    std::fs::create_dir_all(&data_dir)?;
    let cfg = Arc::new(CoreConfig::new(data_dir, session_timeout)?);

    // PBKDF2 at full strength takes a noticeable moment; keep it off the async workers.
    let cipher = tokio::task::spawn_blocking(move || MessageCipher::from_passphrase(&passphrase))
        .await??;

    let pipeline = Arc::new(MessagePipeline::from_config(cfg.clone(), rules, cipher));

    let purger = Arc::clone(&pipeline);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            purger.sessions().purge_expired(chrono::Utc::now());
        }
    });

    tracing::info!("++ Data directory {}", cfg.data_dir().display());
    tracing::info!("++ Starting triage REST on {}", rest_addr);

    let app = router(AppState { pipeline });
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
