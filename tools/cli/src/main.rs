//! InvoiceDrive CLI - run the upload API or talk to Google Drive directly.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use invoicedrive_server::AppState;
use invoicedrive_storage::credentials::strategies::{CLIENT_SECRETS_FILE, TOKEN_FILE};
use invoicedrive_storage::credentials::{ClientRegistration, CredentialEnv, InteractiveFlow};
use invoicedrive_storage::gdrive::auth::token_http_client;
use invoicedrive_storage::{
    ConfigStore, CredentialResolver, DriveClient, DriveConfig, DriveEndpoints, DriveService,
    InvoiceStore, ResolverOptions, UploadRequest,
};

#[derive(Parser)]
#[command(name = "invoicedrive")]
#[command(about = "InvoiceDrive - Upload generated invoices to Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// Directory holding drive_config.json and credential files.
    #[arg(long, env = "INVOICEDRIVE_CONFIG_DIR", default_value = "config", global = true)]
    config_dir: PathBuf,

    /// Directory for saved invoices and upload staging.
    #[arg(long, env = "INVOICEDRIVE_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Timeout for Drive API calls, in seconds.
    #[arg(long, default_value_t = 30, global = true)]
    api_timeout: u64,

    /// Timeout for token endpoint calls, in seconds.
    #[arg(long, default_value_t = 15, global = true)]
    token_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Port to listen on.
        #[arg(short, long, env = "PORT", default_value_t = 5000)]
        port: u16,

        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Deployment environment name.
        #[arg(long, env = "ENVIRONMENT", default_value = "development")]
        environment: String,

        /// Allow the browser consent flow when no stored credential works.
        #[arg(long)]
        interactive_auth: bool,
    },

    /// Authorize through the browser and store the token cache.
    Auth {
        /// Print the consent URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Upload a single file.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Destination folder ID (default: configured folder).
        #[arg(short, long)]
        folder: Option<String>,

        /// Name on Drive (default: the file name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List folders.
    Folders {
        /// Only list children of this folder ID.
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Create a folder.
    Mkdir {
        /// Folder name.
        name: String,

        /// Parent folder ID.
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Show the authenticated account.
    Whoami,

    /// Rewrite the upload configuration.
    Configure {
        /// Default destination folder ID. Empty means the Drive root.
        #[arg(long, default_value = "")]
        folder_id: String,

        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        auto_upload: bool,

        /// Delete local files after a successful upload.
        #[arg(long, action = ArgAction::Set, default_value_t = false)]
        delete_after_upload: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = cli.settings;

    match cli.command {
        Commands::Serve {
            port,
            host,
            environment,
            interactive_auth,
        } => cmd_serve(&settings, &host, port, &environment, interactive_auth).await,

        Commands::Auth { no_browser } => cmd_auth(&settings, no_browser).await,

        Commands::Upload { file, folder, name } => cmd_upload(&settings, &file, folder, name).await,

        Commands::Folders { parent } => cmd_folders(&settings, parent.as_deref()).await,

        Commands::Mkdir { name, parent } => cmd_mkdir(&settings, &name, parent.as_deref()).await,

        Commands::Whoami => cmd_whoami(&settings).await,

        Commands::Configure {
            folder_id,
            auto_upload,
            delete_after_upload,
        } => cmd_configure(&settings, folder_id, auto_upload, delete_after_upload).await,
    }
}

/// Build the Drive service from the settings.
async fn open_service(settings: &Settings, interactive: bool) -> Result<DriveService> {
    let mut options = ResolverOptions::new(&settings.config_dir);
    options.interactive = interactive;
    options.token_timeout = Duration::from_secs(settings.token_timeout);
    options.env = CredentialEnv::from_process();

    let resolver =
        CredentialResolver::from_options(options).context("Failed to set up credentials")?;
    let client = DriveClient::new(
        DriveEndpoints::default(),
        Duration::from_secs(settings.api_timeout),
    )
    .context("Failed to create Drive client")?;

    DriveService::open(
        Arc::new(resolver),
        client,
        ConfigStore::in_dir(&settings.config_dir),
        settings.data_dir.join("temp"),
    )
    .await
    .context("Failed to load drive configuration")
}

/// Run the HTTP API.
async fn cmd_serve(
    settings: &Settings,
    host: &str,
    port: u16,
    environment: &str,
    interactive_auth: bool,
) -> Result<()> {
    info!("Starting InvoiceDrive ({} environment)", environment);

    let service = Arc::new(open_service(settings, interactive_auth).await?);

    match service.user_info().await {
        Ok(user) => {
            info!(
                "Authenticated as: {}",
                user.email.as_deref().unwrap_or("Unknown")
            );
            info!("User name: {}", user.name.as_deref().unwrap_or("Unknown"));
        }
        Err(e) => warn!("Not authenticated with Google Drive: {}", e),
    }

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;

    let state = AppState::new(service, InvoiceStore::new(&settings.data_dir));
    invoicedrive_server::serve(listener, state)
        .await
        .context("Server error")
}

/// Force the browser consent flow and write the token cache.
async fn cmd_auth(settings: &Settings, no_browser: bool) -> Result<()> {
    let secrets_path = settings.config_dir.join(CLIENT_SECRETS_FILE);
    let secrets = tokio::fs::read_to_string(&secrets_path)
        .await
        .with_context(|| format!("Failed to read {}", secrets_path.display()))?;
    let registration = ClientRegistration::from_json(&secrets)?;

    let http = token_http_client(Duration::from_secs(settings.token_timeout))?;
    let mut flow = InteractiveFlow::new(http, Duration::from_secs(300));
    if no_browser {
        flow = flow.without_browser();
    }

    let bundle = flow.run(&registration).await.context("Authorization failed")?;

    let token_path = settings.config_dir.join(TOKEN_FILE);
    bundle
        .save(&token_path)
        .await
        .context("Failed to save token cache")?;

    println!("Authorization complete.");
    println!("  Token cache: {}", token_path.display());

    Ok(())
}

/// Upload one file.
async fn cmd_upload(
    settings: &Settings,
    file: &Path,
    folder: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let service = open_service(settings, false).await?;

    let mut request = UploadRequest::file(file).in_folder(folder);
    if let Some(name) = name {
        request = request.named(name);
    }

    let uploaded = service.upload(request).await.context("Upload failed")?;

    println!("Uploaded {}", uploaded.file_name);
    println!("  ID: {}", uploaded.file_id);
    if let Some(link) = uploaded.web_link {
        println!("  Link: {}", link);
    }

    Ok(())
}

/// List folders.
async fn cmd_folders(settings: &Settings, parent: Option<&str>) -> Result<()> {
    let service = open_service(settings, false).await?;
    let folders = service.list_folders(parent).await;

    if folders.is_empty() {
        println!("No folders found.");
        return Ok(());
    }

    for folder in folders {
        println!("{}  {}", folder.id, folder.name);
    }

    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(settings: &Settings, name: &str, parent: Option<&str>) -> Result<()> {
    let service = open_service(settings, false).await?;
    let folder = service
        .create_folder(name, parent)
        .await
        .context("Failed to create folder")?;

    println!("Created folder {}", folder.name);
    println!("  ID: {}", folder.id);

    Ok(())
}

/// Show the authenticated account.
async fn cmd_whoami(settings: &Settings) -> Result<()> {
    let service = open_service(settings, false).await?;
    let user = service.user_info().await?;

    println!("Email: {}", user.email.as_deref().unwrap_or("Unknown"));
    println!("Name:  {}", user.name.as_deref().unwrap_or("Unknown"));

    Ok(())
}

/// Rewrite the upload configuration.
async fn cmd_configure(
    settings: &Settings,
    folder_id: String,
    auto_upload: bool,
    delete_after_upload: bool,
) -> Result<()> {
    let service = open_service(settings, false).await?;
    let config = service
        .update_config(DriveConfig {
            folder_id,
            auto_upload,
            delete_after_upload,
            updated_at: None,
        })
        .await
        .context("Failed to save configuration")?;

    println!("Configuration saved to {}", settings.config_dir.display());
    println!(
        "  Folder: {}",
        config.default_folder().unwrap_or("(Drive root)")
    );
    println!("  Auto upload: {}", config.auto_upload);
    println!("  Delete after upload: {}", config.delete_after_upload);

    Ok(())
}
