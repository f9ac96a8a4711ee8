//! submission_report CLI - Count student submissions in a Google Drive folder.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use submission_report::aggregate::{collect_submissions, detail_rows, summarize};
use submission_report::auth::load_client_secrets;
use submission_report::export::XLSX_MIME_TYPE;
use submission_report::render::render_table;
use submission_report::{
    extract_folder_id, to_spreadsheet_bytes, Authenticator, AuthorizationCode, ConsentMode,
    CredentialStore, DriveClient, FileCredentialStore, ReportRow,
};

/// Report how many files each student has submitted to a Drive folder.
#[derive(Parser)]
#[command(name = "submission_report")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OAuth client secrets file downloaded from the Google Cloud console.
    #[arg(long, env = "GOOGLE_CLIENT_SECRETS", default_value = "client_secrets.json")]
    client_secrets: PathBuf,

    /// OAuth client ID, used when the client secrets file does not exist.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret, used when the client secrets file does not exist.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Where the user token is cached between runs.
    #[arg(long, env = "DRIVE_TOKEN_CACHE", default_value = "token.json")]
    token_cache: PathBuf,

    /// Authenticate with a service account key instead of user consent.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    service_account: Option<PathBuf>,

    /// Use an already issued bearer token.
    #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Paste the authorization code instead of receiving it on a local port.
    #[arg(long)]
    manual_auth: bool,

    /// Authorization code obtained out of band for the http://localhost redirect.
    #[arg(long, env = "DRIVE_AUTH_CODE", hide_env_values = true)]
    auth_code: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a submission report for a class folder.
    Report {
        /// Class folder URL or ID; each subfolder is one student.
        folder: String,

        /// One row per submitted file instead of one row per student.
        #[arg(long)]
        detailed: bool,

        /// Spreadsheet to write.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Delete the cached user token.
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: could not install logger: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Logout => {
            let store = FileCredentialStore::open(&cli.token_cache)?;
            store
                .clear()
                .with_context(|| format!("Failed to remove {:?}", cli.token_cache))?;
            println!("Removed cached token {:?}.", store.path());
            Ok(())
        }

        Commands::Report {
            ref folder,
            detailed,
            ref output,
        } => {
            let folder_id = extract_folder_id(folder)
                .with_context(|| format!("Invalid folder URL or ID: {}", folder))?;

            let auth = build_authenticator(&cli)?;
            let client = DriveClient::new(auth);

            let folders = client
                .list_child_folders(&folder_id)
                .await
                .with_context(|| format!("Failed to list student folders in {}", folder_id))?;

            if folders.is_empty() {
                println!("Warning: No student folders found. Please check the folder ID and permissions.");
                return Ok(());
            }
            info!("Found {} student folders", folders.len());

            let submissions = collect_submissions(&folders, &client)
                .await
                .context("Failed to list submitted files")?;

            if detailed {
                let rows = detail_rows(&submissions);
                if rows.is_empty() {
                    println!("Warning: No files found in any folders.");
                    return Ok(());
                }
                let path = output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("detailed_submission_report.xlsx"));
                write_report(&rows, &path)
            } else {
                let rows = summarize(&submissions);
                let path = output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("submission_report.xlsx"));
                write_report(&rows, &path)
            }
        }
    }
}

fn build_authenticator(cli: &Cli) -> Result<Authenticator> {
    if let Some(token) = &cli.access_token {
        return Ok(Authenticator::from_token(token.clone()));
    }

    if let Some(path) = &cli.service_account {
        return Authenticator::from_service_account_file(path)
            .with_context(|| format!("Failed to load service account key from {:?}", path));
    }

    let secrets = load_client_secrets(
        &cli.client_secrets,
        cli.client_id.clone(),
        cli.client_secret.clone(),
    )
    .with_context(|| format!("Failed to load OAuth client from {:?}", cli.client_secrets))?;

    let store = FileCredentialStore::open(&cli.token_cache)
        .with_context(|| format!("Failed to open token cache {:?}", cli.token_cache))?;

    let consent = match &cli.auth_code {
        Some(code) => ConsentMode::Provided(AuthorizationCode::pasted(code.clone())),
        None if cli.manual_auth => ConsentMode::Manual,
        None => ConsentMode::LocalServer,
    };

    Ok(Authenticator::user(secrets, Arc::new(store), consent))
}

fn write_report<R: ReportRow>(rows: &[R], path: &Path) -> Result<()> {
    print!("{}", render_table(rows));

    let bytes = to_spreadsheet_bytes(rows).context("Failed to build spreadsheet")?;
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;

    println!();
    println!(
        "Saved {} rows to {:?} ({}, {})",
        rows.len(),
        path,
        human_size(bytes.len()),
        XLSX_MIME_TYPE
    );
    Ok(())
}

/// Format bytes into human-readable size.
fn human_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
