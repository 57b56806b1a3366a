use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    joycycles_tracker::start_server().await
}
