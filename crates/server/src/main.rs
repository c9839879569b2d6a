//! Voice Gateway Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_gateway_adapters::{
    HttpQueryResolver, HttpSpeechToText, HttpTextToSpeech, HttpTokenVerifier,
    ResolverClientConfig, SttClientConfig, TtsClientConfig, VerifierClientConfig,
};
use voice_gateway_config::{load_settings, Settings};
use voice_gateway_core::ChatStore;
use voice_gateway_persistence::InMemoryChatStore;
use voice_gateway_server::{create_router, init_metrics, AppState};

/// Transport timeouts sit above the pipeline deadlines so the deadline,
/// not the HTTP client, decides when a phase has failed.
const TRANSPORT_TIMEOUT_MARGIN_MS: u64 = 5_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from files and environment.
    // Priority: PORT/REQUIRE_AUTH > env vars > config/{env}.yaml > defaults.
    let env = std::env::var("VOICE_GATEWAY_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            let mut settings = Settings::default();
            settings.apply_env_overrides();
            settings
        },
    };

    init_tracing(&settings);

    tracing::info!("Starting Voice Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?settings.environment,
        require_auth = settings.server.require_auth,
        "Configuration loaded"
    );

    let _metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    // Chat store: ScyllaDB when enabled, in-memory otherwise
    let store: Arc<dyn ChatStore> = if settings.persistence.enabled {
        tracing::info!("Initializing ScyllaDB persistence layer...");
        match voice_gateway_persistence::init(&settings.persistence).await {
            Ok(store) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                Arc::new(store)
            },
            Err(e) => {
                tracing::error!(
                    "Failed to initialize ScyllaDB: {}. Falling back to in-memory.",
                    e
                );
                Arc::new(InMemoryChatStore::new())
            },
        }
    } else {
        tracing::info!("Persistence disabled, using in-memory chat store");
        Arc::new(InMemoryChatStore::new())
    };

    // External adapters
    let verifier = Arc::new(HttpTokenVerifier::new(VerifierClientConfig {
        url: settings.adapters.identity_url.clone(),
        ..Default::default()
    })?);
    let stt = Arc::new(HttpSpeechToText::new(SttClientConfig {
        url: settings.adapters.stt_url.clone(),
        api_key: settings.adapters.api_key.clone(),
        timeout_ms: settings.deadlines.stt_ms + TRANSPORT_TIMEOUT_MARGIN_MS,
    })?);
    let tts = Arc::new(HttpTextToSpeech::new(TtsClientConfig {
        url: settings.adapters.tts_url.clone(),
        api_key: settings.adapters.api_key.clone(),
        timeout_ms: settings.deadlines.tts_ms + TRANSPORT_TIMEOUT_MARGIN_MS,
        ..Default::default()
    })?);
    let resolver = Arc::new(HttpQueryResolver::new(ResolverClientConfig {
        url: settings.adapters.resolver_url.clone(),
        timeout_ms: settings.deadlines.query_ms + TRANSPORT_TIMEOUT_MARGIN_MS,
    })?);

    let port = settings.server.port;
    let state = AppState::new(settings, verifier, stt, tts, resolver, store);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing (with optional OpenTelemetry when feature enabled)
#[cfg(feature = "telemetry")]
fn init_tracing(settings: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("voice_gateway={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &settings.observability.otlp_endpoint {
        if settings.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "voice-gateway"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                    return;
                },
                Err(e) => eprintln!("Failed to initialize OpenTelemetry: {}. Falling back.", e),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

/// Initialize tracing (console only - telemetry feature disabled)
#[cfg(not(feature = "telemetry"))]
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("voice_gateway={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
