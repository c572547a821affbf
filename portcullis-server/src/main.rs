use anyhow::Context;
use portcullis_auth::ProviderConfig;
use portcullis_server::{ServerConfig, run_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let provider = ProviderConfig::from_env().context("invalid identity provider configuration")?;
    run_server(ServerConfig::from_env(), provider).await
}
