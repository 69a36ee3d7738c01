use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    rfplayer_cli::main_entry().await
}
