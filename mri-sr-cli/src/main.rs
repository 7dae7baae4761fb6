mod cli;
mod commands;
mod output;

use std::process;
use std::time::Duration;

use clap::Parser;
use mri_sr_client::{ClientConfig, Error};
use mri_sr_client::logging::{LoggingOptions, init_logging};
use tracing::{debug, error};

use crate::cli::{Args, Commands};
use crate::commands::CommandExecutor;
use crate::output::OutputManager;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let json = args.json;
    let output = OutputManager::new(json);

    let filter = args
        .verbose
        .then(|| "mri_sr_client=debug,mri_sr_cli=debug,reqwest=info".to_string());
    let logging = init_logging(&LoggingOptions {
        filter,
        log_dir: args.log_dir.clone(),
        ansi: !json,
    });
    let (logging, _guard) = match logging {
        Ok(installed) => installed,
        Err(e) => {
            output.print_error(&format!("Failed to initialize logging: {e}"));
            process::exit(1);
        }
    };
    if let Some(directive) = &args.log_filter {
        if let Err(e) = logging.set_filter(directive) {
            output.print_error(&e.to_string());
            process::exit(1);
        }
    }
    debug!(
        filter = %logging.get_filter(),
        log_dir = ?logging.log_dir(),
        "Logging initialized"
    );

    if let Err(e) = run(args, output).await {
        error!("Command failed: {e:#}");
        // Server and network failures get the friendly wording.
        let message = match e.downcast_ref::<Error>() {
            Some(err) if err.status().is_some() || matches!(err, Error::Network(_)) => {
                err.user_message()
            }
            _ => format!("{e:#}"),
        };
        OutputManager::new(json).print_error(&message);
        process::exit(1);
    }
}

async fn run(args: Args, output: OutputManager) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = args.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(token) = args.token {
        config = config.with_token(token);
    }
    config.validate()?;

    let executor = CommandExecutor::new(&config, output)?;

    match args.command {
        Commands::List {
            page,
            size,
            status,
            job_type,
        } => executor.list(page, size, status, job_type).await,
        Commands::Show { job_id } => executor.show(&job_id).await,
        Commands::Watch {
            job_id,
            interval_ms,
        } => {
            let interval = interval_ms.map(Duration::from_millis);
            executor.watch(&job_id, interval).await
        }
        Commands::Upload { files, watch } => executor.upload(&files, watch).await,
        Commands::Retry { job_id, watch } => executor.retry(&job_id, watch).await,
        Commands::Cancel { job_id } => executor.cancel(&job_id).await,
        Commands::Infer {
            lr_file_id,
            model,
            scale,
            watch,
        } => executor.infer(lr_file_id, model, scale, watch).await,
        Commands::Resolve {
            job_id,
            index,
            mode,
        } => executor.resolve(&job_id, index, mode.map(Into::into)).await,
        Commands::Download {
            job_id,
            output_dir,
            index,
            mode,
        } => {
            executor
                .download(&job_id, &output_dir, index, mode.map(Into::into))
                .await
        }
        Commands::Files { job, limit } => executor.files(job, limit).await,
    }
}
