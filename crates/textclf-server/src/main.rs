use clap::Parser;
use textclf_server::cli::{Cli, Commands};
use textclf_server::config::ServerConfig;
use textclf_server::telemetry::{init_metrics, init_tracing};
use textclf_server::{run_server, smoke};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = ServerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve(args) => {
            let config = config.with_serve_args(&args);
            config.validate()?;

            info!(
                version = env!("CARGO_PKG_VERSION"),
                model = %config.model_spec().id(),
                device = %config.model.device,
                "Starting textclf"
            );

            let metrics = init_metrics()?;
            run_server(config, metrics).await?;
        }

        Commands::Smoke(args) => {
            let config = config.with_model_args(&args.model);
            smoke::run(&args, &config).await?;
        }
    }

    Ok(())
}
