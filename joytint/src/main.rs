use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod async_hid_impl;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    cli::execute().await
}
