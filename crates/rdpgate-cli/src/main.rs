//! rdpgate - ephemeral remote-desktop access through Cloudflare Tunnel

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rdpgate_cli::{output, preflight, SystemdSupervisor, SystemdTimerScheduler};
use rdpgate_cloudflare::{CloudflareDns, CloudflaredTunnels};
use rdpgate_session::{CreateRequest, SessionError, SessionId, SessionManager, Settings};

const DEFAULT_CONFIG_PATH: &str = "/etc/rdpgate/config.json";

/// rdpgate - expose this host's remote desktop under a temporary hostname
#[derive(Parser, Debug)]
#[command(name = "rdpgate")]
#[command(about = "Ephemeral remote-desktop sessions through Cloudflare Tunnel", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON); built-in defaults apply when it does not exist
    #[arg(long, global = true, env = "RDPGATE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Domain session hostnames are published under
    #[arg(long, global = true, env = "BASE_DOMAIN")]
    base_domain: Option<String>,

    /// Cloudflare API token with DNS edit rights on the zone
    #[arg(long, global = true, env = "CF_API_TOKEN", hide_env_values = true)]
    cf_api_token: Option<String>,

    /// Cloudflare zone id of the base domain
    #[arg(long, global = true, env = "CF_ZONE_ID")]
    cf_zone_id: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a session and print its hostname and credentials
    Create {
        /// Comma-separated usernames (default: admin)
        #[arg(long)]
        users: Option<String>,

        /// Tear the session down automatically after this many hours (0 = never)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Remove every resource of a session
    Teardown {
        /// Session id (rdp-xxxxxxxx) or its hostname
        target: String,
    },

    /// Show what is left of a session on this host
    Status {
        /// Session id (rdp-xxxxxxxx) or its hostname
        target: String,
    },

    /// List sessions that have an ingress config on this host
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::from(exit_code_of(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(&cli)?;
    debug!("Settings: {:?}", settings);

    match &cli.command {
        Commands::Create { users, ttl_hours } => {
            let request =
                CreateRequest::parse(users.as_deref(), *ttl_hours, &settings.default_username)?;

            preflight::require_root()?;
            let mut tools: Vec<PathBuf> = preflight::HOST_TOOLS.iter().map(PathBuf::from).collect();
            tools.push(settings.cloudflared_bin.clone());
            preflight::require_tools(&tools)?;

            let manager = build_manager(settings, &cli)?;
            match manager.create(&request).await {
                Ok(report) => {
                    print!("{}", output::render_created(&report));
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => {
                    eprint!("{}", output::render_create_failure(&failure));
                    Ok(ExitCode::from(failure.exit_code()))
                }
            }
        }
        Commands::Teardown { target } => {
            let id = SessionId::from_target(target)?;

            preflight::require_root()?;
            preflight::require_tools(&["systemctl"])?;
            if preflight::require_tools(&[&settings.cloudflared_bin]).is_err() {
                warn!(
                    "{} not found; the tunnel registration cannot be removed",
                    settings.cloudflared_bin.display()
                );
            }

            let manager = build_manager(settings, &cli)?;
            let report = manager.teardown(&id).await?;
            print!("{}", output::render_teardown(&report));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { target } => {
            let id = SessionId::from_target(target)?;
            preflight::require_tools(&["systemctl"])?;

            let manager = build_manager(settings, &cli)?;
            let status = manager.status(&id).await?;
            print!("{}", output::render_status(&status));
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let base_domain = settings.base_domain.clone();
            let manager = build_manager(settings, &cli)?;
            let sessions = manager.list().await?;
            print!("{}", output::render_list(&sessions, &base_domain));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Settings file overlaid with flags and environment
fn load_settings(cli: &Cli) -> Result<Settings, SessionError> {
    let mut settings = Settings::load(&cli.config)?;

    if let Some(domain) = cli.base_domain.as_deref().filter(|d| !d.is_empty()) {
        settings.base_domain = domain.to_string();
    }
    if let Some(token) = &cli.cf_api_token {
        settings.dns.api_token = Some(token.clone());
    }
    if let Some(zone) = &cli.cf_zone_id {
        settings.dns.zone_id = Some(zone.clone());
    }

    settings
        .validate()
        .map_err(|message| SessionError::Config {
            path: cli.config.clone(),
            message,
        })?;
    Ok(settings)
}

fn build_manager(settings: Settings, cli: &Cli) -> Result<Arc<SessionManager>> {
    let mut tunnels = CloudflaredTunnels::new(&settings.cloudflared_bin);
    if let Some(cert) = &settings.origin_cert {
        tunnels = tunnels.with_origin_cert(cert);
    }

    let supervisor = SystemdSupervisor::new(&settings.layout.unit_dir);

    let program = std::env::current_exe().context("Failed to locate the rdpgate executable")?;
    let expiry = SystemdTimerScheduler::new(program, absolute(&cli.config))
        .forward_env("BASE_DOMAIN", Some(&settings.base_domain))
        .forward_env("CF_API_TOKEN", settings.dns.api_token.as_deref())
        .forward_env("CF_ZONE_ID", settings.dns.zone_id.as_deref());

    let dns = match settings.dns.credentials() {
        Some((token, zone)) => Some(
            CloudflareDns::new(token, zone).context("Failed to initialize the Cloudflare API client")?,
        ),
        None => {
            warn!("CF_API_TOKEN/CF_ZONE_ID not set; DNS records will not be managed");
            None
        }
    };

    let mut manager = SessionManager::new(
        settings,
        Arc::new(tunnels),
        Arc::new(supervisor),
        Arc::new(expiry),
    );
    if let Some(dns) = dns {
        manager = manager.with_dns(Arc::new(dns));
    }
    Ok(Arc::new(manager))
}

/// The scheduled teardown runs from another working directory
fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Exit status of the first session error in the chain, 1 otherwise
fn exit_code_of(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SessionError>())
        .map(SessionError::exit_code)
        .unwrap_or(1)
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
