use std::{net::Ipv4Addr, process::ExitCode, sync::Arc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use todo_studio::config::{Backend, Config};
use todo_studio::gateway::{Gateway, LocalGateway, SupabaseGateway};
use todo_studio::{create_app, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let gateway: Arc<dyn Gateway> = match &config.backend {
        Backend::Supabase { url, anon_key } => {
            info!(url = %url, "using hosted backend");
            Arc::new(SupabaseGateway::new(url, anon_key))
        }
        Backend::Local {
            db_path,
            auto_confirm,
        } => {
            info!(path = %db_path.display(), auto_confirm, "using local backend");
            let local = LocalGateway::open(db_path)?.with_auto_confirm(*auto_confirm);
            let removed = local.cleanup_expired_sessions()?;
            if removed > 0 {
                info!(removed, "dropped expired sessions");
            }
            Arc::new(local)
        }
    };

    let state = AppState::new(gateway, config.utc_offset);
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("running on {addr:?}");

    axum::serve(listener, app).await?;
    Ok(())
}
