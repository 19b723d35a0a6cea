use blogdesk::App;
use tracing::error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let app = match App::new(&config_path).await {
        Ok(app) => app,
        Err(e) => {
            error!("failed to create app: {}", e);
            return;
        }
    };
    if let Err(e) = app.serve().await {
        error!("failed to serve app: {}", e);
    }
}
