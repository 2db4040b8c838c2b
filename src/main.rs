mod cli;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "herald=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match cli::run() {
        cli::RunOutcome::Serve(config) => {
            if let Err(err) = herald::serve(config).await {
                tracing::error!("server stopped: {err:#}");
                std::process::exit(1);
            }
        }
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter__should_parse_and_only_target_this_crate() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(
            DEFAULT_LOG_FILTER
                .split(',')
                .all(|directive| directive.starts_with("herald"))
        );
    }
}
