//! dataship: upload a file (or register a hosted URL) as a dataset.
//!
//! Reads DATASHIP_ACCESS_TOKEN (required), DATASHIP_API_URL and HTTP_PROXY
//! from the environment or a `.env` file.

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use dataship_api_client::ApiClient;
use dataship_cli::{format_progress, init_tracing, is_remote_source, parse_dataset_id};
use dataship_core::{ServiceConfig, UploadConfig};
use dataship_upload::UploadOrchestrator;

#[derive(Parser)]
#[command(name = "dataship", version, about = "Upload a file to the dataship upload service")]
struct Cli {
    /// Target dataset, `<account>.<name>`
    dataset_id: String,
    /// Local file to upload, or an http(s) URL to register in place
    source: String,
    /// Patch an existing dataset instead of failing
    #[arg(long)]
    patch: bool,
    /// Display name (defaults to the file name)
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = ServiceConfig::from_env()?;
    let token = service.require_access_token()?.to_string();
    let account = parse_dataset_id(&cli.dataset_id)?;

    let mut config = UploadConfig::builder()
        .account(account)
        .dataset_id(&cli.dataset_id)
        .access_token(&token)
        .patch_existing(cli.patch)
        .service_defaults(&service);
    if let Some(name) = cli.name {
        config = config.display_name(name);
    }

    let orchestrator = UploadOrchestrator::from_service_config(&service);
    let record = if is_remote_source(&cli.source) {
        orchestrator
            .create_from_url(config.build(), &cli.source)
            .await?
    } else {
        let handle = orchestrator.start(config.file(&cli.source).build())?;
        let mut last_line = String::new();
        handle
            .wait_with_progress(|snapshot| {
                let line = format_progress(snapshot);
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            })
            .await?
    };

    let api = ApiClient::new(&service.base_url, &token, None, service.request_timeout)?;
    println!("Upload complete");
    println!("{}", api.status_url(account, &record.id));
    tracing::info!(dataset_id = %record.dataset_ref(), upload_id = %record.id, "Upload registered");
    Ok(())
}
