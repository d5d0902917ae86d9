use clap::Parser;
use billo_client::cli::utils::CommandFailed;
use billo_client::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let default_level = if billo_client::is_development!() { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = billo_client::cli::run(cli).await {
        let reported = e.downcast_ref::<CommandFailed>().is_some_and(|failed| failed.reported);
        if !reported {
            match std::env::var("CLI_VERBOSE").as_deref() {
                Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
                _ => eprintln!("Error: {e}"),
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
