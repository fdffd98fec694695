use std::process::ExitCode;

use clap::Parser;
use legal_analyzer_lib::config::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    legal_analyzer_lib::init_tracing(cli.settings.log_format);

    match legal_analyzer_lib::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
