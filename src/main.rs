use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = keywheel::cli::run_cli().await {
        error!("keywheel failed to start: {:#}", e);
        std::process::exit(1);
    }
}
