// Leshiy-AI dispatcher binary

use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    leshiy_dispatch_lib::init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Err(e) = leshiy_dispatch_lib::run(config_path).await {
        tracing::error!("Dispatcher failed: {}", e);
        return Err(e);
    }
    Ok(())
}
