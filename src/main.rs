use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callhub::config::{self, Config};
use callhub::registry::IntegrationRegistry;
use callhub::store::memory::MemoryStore;
use callhub::store::postgres::PgStore;
use callhub::store::IntegrationStore;
use callhub::vault::{builtin::generate_master_key, CredentialVault};
use callhub::{metrics, AppState};

mod cli;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let outcome = match args.command {
        Some(cli::Commands::Serve { port, ephemeral }) => serve(cfg, port, ephemeral).await,
        Some(cli::Commands::Integration { command }) => {
            let store = PgStore::connect(&cfg.database_url).await?;
            let vault = Arc::new(CredentialVault::new(&cfg.master_key)?);
            let registry = IntegrationRegistry::new(Arc::new(store), vault);
            integration_command(command, &registry).await
        }
        Some(cli::Commands::Keygen) => {
            println!("{}", generate_master_key());
            Ok(())
        }
        None => {
            let port = cfg.port;
            serve(cfg, port, false).await
        }
    };

    if let Err(e) = &outcome {
        tracing::error!("callhub exited with error: {:#}", e);
    }
    outcome
}

/// fmt output (JSON with `CALLHUB_LOG_FORMAT=json`), plus OTLP export when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let otlp = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(_) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic())
                .with_trace_config(
                    sdktrace::config()
                        .with_resource(Resource::new(vec![KeyValue::new("service.name", "callhub")])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .context("failed to install OpenTelemetry tracer")?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        Err(_) => None,
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("callhub=debug,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter).with(otlp);

    if std::env::var("CALLHUB_LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}

async fn open_store(cfg: &Config, ephemeral: bool) -> anyhow::Result<Arc<dyn IntegrationStore>> {
    if ephemeral {
        tracing::warn!("Using the in-memory store; integrations are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    tracing::info!("Connecting to PostgreSQL");
    let store = PgStore::connect(&cfg.database_url).await?;
    store.migrate().await.context("migrations failed")?;
    tracing::info!("Migrations applied");
    Ok(Arc::new(store))
}

/// The frontend origin, plus any local dev server.
fn cors(frontend_url: String) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin = origin.to_str().unwrap_or_default();
            origin == frontend_url
                || origin.starts_with("http://localhost:")
                || origin.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-organization-id"),
        ])
        .allow_credentials(true)
}

async fn serve(cfg: Config, port: u16, ephemeral: bool) -> anyhow::Result<()> {
    let cfg = cfg.with_port(port);
    let store = open_store(&cfg, ephemeral).await?;
    metrics::init().context("failed to register metrics")?;

    let cors = cors(cfg.frontend_url.clone());
    let state = Arc::new(AppState::new(cfg, store)?);
    let app = callhub::app(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(response_headers));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!(%addr, "callhub listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Request id and hardening headers on every response. Bodies can carry
/// join links and booking ids, so nothing is cacheable.
async fn response_headers(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.remove(header::SERVER);
    resp
}

async fn integration_command(
    cmd: cli::IntegrationCommands,
    registry: &IntegrationRegistry,
) -> anyhow::Result<()> {
    match cmd {
        cli::IntegrationCommands::List {
            org,
            integration_type,
        } => {
            let org_id = uuid::Uuid::parse_str(&org).context("invalid organization id")?;
            let integration_type = integration_type
                .map(|t| t.parse().map_err(anyhow::Error::msg))
                .transpose()?;
            let rows = registry.list(org_id, integration_type).await?;
            if rows.is_empty() {
                println!("No integrations found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<18} {:<16} {:<9} {:<10}",
                "ID", "NAME", "PROVIDER", "ACTIVE", "CONNECTED"
            );
            for row in rows {
                println!(
                    "{:<38} {:<18} {:<16} {:<9} {:<10}",
                    row.id, row.name, row.provider, row.is_active, row.is_connected
                );
            }
        }
        cli::IntegrationCommands::Delete { org, id } => {
            let org_id = uuid::Uuid::parse_str(&org).context("invalid organization id")?;
            let id = uuid::Uuid::parse_str(&id).context("invalid integration id")?;
            let removed = registry.delete(org_id, id).await?;
            println!("Deleted {} integration {}.", removed.provider, removed.id);
        }
    }
    Ok(())
}
