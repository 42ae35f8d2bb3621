//! HTTP server for slated

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::config::{Config, StoreBackend};
use crate::gemini::{GeminiClient, GenerativeModel};
use crate::mailer::{LogMailer, Mailer, SmtpMailer};
use crate::middleware::error_details;
use crate::routes;
use crate::store::{MemoryStore, Store, SupabaseStore};
use crate::tutor::Tutor;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub tutor: Tutor,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub start_time: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: Config,
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tutor = Tutor::new(model, config.gemini.retry_policy());
        let auth = AuthService::new(&config.auth, store.clone(), mailer);
        Self {
            config,
            tutor,
            store,
            auth,
            start_time: Instant::now(),
        }
    }

    /// Build every client from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let model: Arc<dyn GenerativeModel> =
            Arc::new(GeminiClient::new(&config.gemini).context("Failed to build Gemini client")?);
        info!("Generative model: {}", model.model_name());

        let store: Arc<dyn Store> = match config.store.backend {
            StoreBackend::Supabase => {
                info!("Store: Supabase at {}", config.store.supabase_url);
                Arc::new(SupabaseStore::new(&config.store).context("Failed to build Supabase client")?)
            }
            StoreBackend::Memory => {
                warn!("Store: in-memory, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = if config.smtp.host.is_empty() {
            warn!("SMTP_HOST not set, sign-in codes will only be logged");
            Arc::new(LogMailer)
        } else {
            Arc::new(SmtpMailer::new(&config.smtp).context("Failed to configure SMTP")?)
        };

        Ok(Self::new(config, model, store, mailer))
    }
}

/// Browser clients call from any origin
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .merge(routes::auth_routes())
        .merge(routes::user_routes(state.clone()))
        .merge(routes::practice_routes())
        .merge(routes::vision_routes())
        .merge(routes::ai_routes())
        .merge(routes::history_routes())
        .merge(routes::health_routes())
        .layer(from_fn_with_state(state.clone(), error_details))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C or SIGTERM
pub async fn run(state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.server.port);
    let environment = state.config.server.environment.clone();
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{} ({})", addr, environment);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
