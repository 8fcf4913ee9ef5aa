//! Background removal HTTP service

use smart_bgremove::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
