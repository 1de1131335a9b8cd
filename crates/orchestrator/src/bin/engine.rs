//! Engine binary entry point: tracing init, config load from environment,
//! CSM validation, and orchestrator wiring.
//!
//! Grounded on the teacher's `gui/src-tauri/src/main.rs` (tracing_subscriber
//! setup, fatal-error `std::process::exit` pattern), minus the Tauri shell —
//! the HTTP/UI ingress described in spec.md §6 is out of scope here.

use ktengine_core::csm::{self, CsmCredential, Mode};
use ktengine_networking::kia::contracts::FetchQuoteRequest;
use ktengine_networking::{KiaApiClient, KiaGateway};
use ktengine_orchestrator::{EngineRuntime, UagOrchestrator};
use ktengine_persistence::Database;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_watch_symbols() -> Vec<String> {
    std::env::var("KTENGINE_WATCH_SYMBOLS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_mode() -> Mode {
    match std::env::var("KTENGINE_MODE").as_deref() {
        Ok("live") => Mode::Live,
        _ => Mode::Mock,
    }
}

fn env_buy_budget() -> Option<Decimal> {
    std::env::var("KTENGINE_BUY_BUDGET")
        .ok()
        .and_then(|s| Decimal::from_str(&s).ok())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ktengine_orchestrator=info,ktengine_engine=info,ktengine_networking=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting intraday trading engine");

    let data_dir = std::env::var("KTENGINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs_next::data_local_dir()
                .map(|p| p.join("ktengine"))
                .unwrap_or_else(|| PathBuf::from("."))
        });

    let watch_symbols = csm::normalize_symbols(&env_watch_symbols());
    if let Err(e) = csm::validate_watch_symbols(&watch_symbols) {
        eprintln!("FATAL: invalid watch symbol configuration: {e}");
        std::process::exit(1);
    }

    let mode = env_mode();
    let live_mode_confirmed = std::env::var("KTENGINE_LIVE_MODE_CONFIRMED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if let Err(e) = csm::validate_mode(mode, live_mode_confirmed) {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }

    let account_no = std::env::var("KTENGINE_ACCOUNT_NO").unwrap_or_default();

    let client = match mode {
        Mode::Mock => KiaApiClient::mock(),
        Mode::Live => {
            let credential = CsmCredential {
                app_key: std::env::var("KTENGINE_APP_KEY").unwrap_or_default(),
                app_secret: std::env::var("KTENGINE_APP_SECRET").unwrap_or_default(),
                account_no: account_no.clone(),
                user_id: std::env::var("KTENGINE_USER_ID").unwrap_or_default(),
            };
            if let Err(e) = csm::validate_credential(&credential) {
                eprintln!("FATAL: {e}");
                std::process::exit(1);
            }
            KiaApiClient::live(credential, std::env::var("KTENGINE_BASE_URL").ok(), mode)
        }
    };
    let gateway = Arc::new(KiaGateway::new(client));

    let db_path = data_dir.join("engine.db");
    let db = match Database::connect(&db_path).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("FATAL: failed to open database at {}: {e}", db_path.display());
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path.display(), "database ready");

    // Warm the quote path once so a misconfigured credential fails fast
    // before the background loop starts.
    if matches!(mode, Mode::Live) {
        if let Some(first) = watch_symbols.first() {
            if let Err(e) = gateway
                .fetch_quote(FetchQuoteRequest {
                    mode: Some(mode),
                    symbol: first.clone(),
                })
                .await
            {
                tracing::warn!(error = %e, "startup quote probe failed, continuing anyway");
            }
        }
    }

    let runtime = EngineRuntime::new(data_dir);
    let mut orchestrator = match UagOrchestrator::new(
        runtime,
        db.pool().clone(),
        gateway,
        Some(mode),
        account_no,
        watch_symbols,
        env_buy_budget(),
    ) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("FATAL: failed to construct orchestrator: {e}");
            std::process::exit(1);
        }
    };

    let dry_run = std::env::var("KTENGINE_DRY_RUN")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if let Err(e) = orchestrator.start_trading(None, dry_run).await {
        eprintln!("FATAL: failed to start trading: {e}");
        std::process::exit(1);
    }

    tracing::info!(dry_run, "trading engine started");

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, stopping");
    orchestrator.stop_trading().await;
}
