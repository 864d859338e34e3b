use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Init logging; --debug lowers the default level for this crate when RUST_LOG is unset
    let default_level = if args.iter().any(|a| a == "--debug") { "warn,docvault=debug" } else { "warn,docvault=info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let code = docvault::cli::run(args).await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
