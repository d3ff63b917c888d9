use anyhow::Result;
use clap::Parser;
use confmix::cli::{
    handle_config_command, handle_monitor_command, handle_render_command, handle_tap_command, Cli,
    CliCommand,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = cli.config.as_deref();
    match cli.command {
        CliCommand::Render(args) => handle_render_command(args, config_path).await,
        CliCommand::Tap(args) => handle_tap_command(args, config_path).await,
        CliCommand::Monitor(args) => handle_monitor_command(args, config_path).await,
        CliCommand::Config(args) => handle_config_command(args, config_path),
        CliCommand::Version => {
            println!("confmix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
