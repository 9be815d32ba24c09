use anyhow::Result;
use trainer::cli::interface::run_cli_interface;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli_interface().await?;
    Ok(())
}
