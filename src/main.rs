use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};

use backoffice::api::users::{process_create_user, CreateUserRequest};
use backoffice::app::{build_router, AppState};
use backoffice::auth::demo_auth::DemoIdentityProvider;
use backoffice::auth::identity::{FirebaseIdentityProvider, IdentityProvider};
use backoffice::config::Settings;
use backoffice::db::category_repository::MongoCategoryRepository;
use backoffice::db::job_repository::MongoJobRepository;
use backoffice::db::media_repository::MongoMediaRepository;
use backoffice::db::memory::MemoryStore;
use backoffice::db::mongo::ensure_indexes;
use backoffice::db::organisation_repository::MongoOrganisationRepository;
use backoffice::db::post_repository::MongoPostRepository;
use backoffice::db::user_repository::MongoUserRepository;
use backoffice::storage::client::{MemoryStorage, S3StorageClient, StorageClient};
use backoffice::{demo_seeder, pages};

#[derive(Parser)]
#[command(name = "backoffice", version, about = "Role-based content dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create the first administrator account and exit.
    BootstrapAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backoffice=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    settings.validate()?;

    let state = build_state(&settings).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&settings, state).await,
        Command::BootstrapAdmin {
            email,
            name,
            password,
        } => {
            let user = process_create_user(
                state.identity.as_ref(),
                state.user_repo.as_ref(),
                CreateUserRequest {
                    email: Some(email),
                    display_name: Some(name),
                    role: Some("admin".to_string()),
                    password: Some(password),
                },
            )
            .await?;
            tracing::info!(uid = %user.id, email = %user.email, "Administrator created");
            Ok(())
        }
    }
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let identity: Arc<dyn IdentityProvider> = match (&settings.identity, settings.demo_mode) {
        (Some(identity), false) => Arc::new(
            FirebaseIdentityProvider::new(identity.project_id.clone(), identity.api_key.clone())
                .await?,
        ),
        _ => {
            let secret = settings.demo_secret.clone().unwrap_or_else(|| {
                let bytes: [u8; 32] = rand::random();
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
            });
            tracing::warn!("Demo mode enabled: using the built-in demo identity provider");
            Arc::new(DemoIdentityProvider::new(secret))
        }
    };

    let storage_client: Arc<dyn StorageClient> = match &settings.s3_bucket {
        Some(bucket) => {
            tracing::info!(bucket = %bucket, "S3 storage client initialized");
            Arc::new(S3StorageClient::connect(bucket.clone(), settings.s3_endpoint.as_deref()).await)
        }
        None => {
            tracing::warn!("No S3 bucket configured, media is kept in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let templates = Arc::new(pages::templates().context("Failed to compile page templates")?);

    let mut state = match &settings.mongodb_uri {
        Some(uri) => {
            let client = mongodb::Client::with_uri_str(uri)
                .await
                .context("Failed to connect to MongoDB")?;
            let db = client.database(&settings.mongodb_database);
            ensure_indexes(&db).await?;
            tracing::info!(database = %settings.mongodb_database, "Connected to MongoDB");

            AppState {
                user_repo: Arc::new(MongoUserRepository::new(&db)),
                post_repo: Arc::new(MongoPostRepository::new(&db)),
                job_repo: Arc::new(MongoJobRepository::new(&db)),
                organisation_repo: Arc::new(MongoOrganisationRepository::new(&db)),
                category_repo: Arc::new(MongoCategoryRepository::new(&db)),
                media_repo: Arc::new(MongoMediaRepository::new(&db)),
                storage_client,
                identity,
                templates,
                cookie_secure: settings.cookie_secure,
                demo_mode: settings.demo_mode,
            }
        }
        None => {
            tracing::warn!("No MongoDB URI configured, records are kept in memory");
            AppState::with_memory_backends(
                Arc::new(MemoryStore::new()),
                storage_client,
                identity,
                templates,
            )
        }
    };
    state.cookie_secure = settings.cookie_secure;
    state.demo_mode = settings.demo_mode;

    Ok(state)
}

async fn serve(settings: &Settings, state: AppState) -> anyhow::Result<()> {
    if state.demo_mode {
        demo_seeder::seed_demo_data(&state)
            .await
            .context("Failed to seed demo data")?;
    }

    let app = build_router(state);

    tracing::info!("Listening on http://{}", settings.bind_addr);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
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
    tracing::info!("Shutdown signal received");
}
