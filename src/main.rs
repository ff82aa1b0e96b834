#[tokio::main]
async fn main() {
    cardindex::tracing::init();

    if let Err(e) = cardindex::app::run().await {
        log::error!("❌ {:#}", e);
        std::process::exit(1);
    }
}
