use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codex_companion::cli::{Cli, Commands, CredentialCommands};
use codex_companion::config::{self, Config};
use codex_companion::models::Credential;
use codex_companion::oauth::OauthClient;
use codex_companion::proxy::upstream::UpstreamClient;
use codex_companion::scheduler::Scheduler;
use codex_companion::store::{self, CredentialStore, LogStore};
use codex_companion::{api, jobs, AppState};

const REACTIVATION_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "codex_companion=info,tower_http=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    match args.command {
        None | Some(Commands::Serve) => run_server(cfg).await,
        Some(Commands::Import) => {
            let store = open_store(&cfg).await?;
            let cred = api::import::from_file(&store, &cfg.codex_home).await?;
            println!("imported credential {} ({})", cred.id, cred.name);
            Ok(())
        }
        Some(Commands::Credential { command }) => {
            let store = open_store(&cfg).await?;
            handle_credential_command(&store, command).await
        }
    }
}

async fn open_store(cfg: &Config) -> anyhow::Result<CredentialStore> {
    let pool = store::open(&cfg.db_path).await?;
    Ok(CredentialStore::new(pool))
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    tracing::info!("opening database {}", cfg.db_path);
    let pool = store::open(&cfg.db_path).await?;

    let credentials = CredentialStore::new(pool.clone());
    let logs = LogStore::new(pool);
    let scheduler = Scheduler::new(credentials.clone(), OauthClient::default());

    let shutdown = CancellationToken::new();
    jobs::reactivator::spawn(credentials.clone(), REACTIVATION_PERIOD, shutdown.clone());

    let state = Arc::new(AppState {
        credentials,
        logs,
        scheduler,
        upstream: UpstreamClient::new(),
        config: cfg.clone(),
    });

    let app = codex_companion::app(state);

    tracing::info!("listening on {}", cfg.addr);
    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down");
                shutdown.cancel();
            }
        })
        .await?;

    shutdown.cancel();
    Ok(())
}

async fn handle_credential_command(
    store: &CredentialStore,
    command: CredentialCommands,
) -> anyhow::Result<()> {
    match command {
        CredentialCommands::List => {
            for cred in store.list().await? {
                print_credential(&cred);
            }
        }
        CredentialCommands::AddKey {
            name,
            secret,
            base_url,
            priority,
        } => {
            let priority = match priority {
                Some(p) => p,
                None => store.next_priority().await?,
            };
            let cred = store
                .add_static_key(&name, &secret, base_url.as_deref(), priority)
                .await?;
            println!("added credential {}", cred.id);
        }
        CredentialCommands::AddLogin {
            name,
            refresh_token,
            tenant_id,
            priority,
        } => {
            let priority = match priority {
                Some(p) => p,
                None => store.next_priority().await?,
            };
            let cred = store
                .add_interactive(&name, &refresh_token, tenant_id.as_deref(), priority)
                .await?;
            println!("added credential {}", cred.id);
        }
        CredentialCommands::Delete { id } => {
            store.delete(id).await?;
            println!("deleted credential {id}");
        }
    }
    Ok(())
}

fn print_credential(cred: &Credential) {
    let state = if cred.exhausted {
        match cred.reset_at {
            Some(t) => format!("exhausted until {t}"),
            None => "exhausted".into(),
        }
    } else {
        "available".into()
    };
    println!(
        "{:>4}  {:<20} {:<18} priority={} {}",
        cred.id,
        cred.name,
        cred.kind_str(),
        cred.priority,
        state
    );
}
