#![warn(clippy::all, rust_2018_idioms)]

use aws_sso_helper::app::clock::SystemClock;
use aws_sso_helper::app::credentials::{render, OutputFormat};
use aws_sso_helper::app::device_auth::{BrowserLauncher, NoBrowser, SystemBrowser};
use aws_sso_helper::app::picker::{DialoguerPicker, Picker, ScriptedPicker};
use aws_sso_helper::app::sso_config::{ambient_region, ClientType, HelperOptions, SsoConfig};
use aws_sso_helper::app::sso_service::AwsSsoService;
use aws_sso_helper::SsoHelper;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_BRANCH"),
    " ",
    env!("GIT_COMMIT"),
    ")"
);

const DEFAULT_LOG_FILTER: &str = "aws_sso_helper=info,aws_config=warn,aws_sigv4=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,hyper=warn,aws_smithy_http=warn,aws_endpoint=warn";

/// Fetch temporary AWS credentials through AWS SSO with a cached login.
#[derive(Parser, Debug)]
#[command(name = "aws-sso-helper", version, long_version = LONG_VERSION)]
struct Cli {
    /// SSO portal start URL, or the portal short name (d-xxxxxxxxxx)
    #[arg(long)]
    start_url: Option<String>,

    /// Account id(s), space-delimited; skips the account picker
    #[arg(long)]
    account_id: Option<String>,

    /// Role name; skips the role picker
    #[arg(long)]
    role_name: Option<String>,

    /// Resolve credentials for every accessible account
    #[arg(long)]
    all_account_roles: bool,

    /// Force a new browser login even if the cached token looks valid
    #[arg(long)]
    refresh_access_token: bool,

    /// Region of the SSO instance; defaults to the AWS region chain
    #[arg(long)]
    region: Option<String>,

    /// Emit only the access key, secret key and session token
    #[arg(long)]
    pass_thru: bool,

    /// Cache file and OIDC client name [default: default]
    #[arg(long)]
    client_name: Option<String>,

    /// OIDC client type
    #[arg(long, value_enum, default_value_t = ClientType::Public)]
    client_type: ClientType,

    /// Seconds to wait for the browser login [default: 120]
    #[arg(long)]
    timeout_in_seconds: Option<u64>,

    /// Directory holding cached tokens [default: ~/.awsssohelper]
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Print the verification URL instead of opening a browser
    #[arg(long)]
    no_browser: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_options(self) -> HelperOptions {
        HelperOptions {
            start_url: self.start_url,
            account_id: self.account_id,
            role_name: self.role_name,
            all_account_roles: self.all_account_roles,
            refresh_access_token: self.refresh_access_token,
            region: self.region,
            pass_thru: self.pass_thru,
            client_name: self.client_name,
            client_type: self.client_type,
            timeout_in_seconds: self.timeout_in_seconds,
            cache_path: self.cache_path,
            output: self.output,
            no_browser: self.no_browser,
        }
    }
}

/// Open the log file under the platform data directory, owner-only on Unix.
fn open_log_file() -> Option<(std::fs::File, PathBuf)> {
    let proj_dirs = directories::ProjectDirs::from("com", "", "aws-sso-helper")?;
    let log_dir = proj_dirs.data_dir().join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    let log_path = log_dir.join("aws-sso-helper.log");

    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .ok()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = file.metadata() {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
            }
        }
    }

    Some((file, log_path))
}

fn init_logging(verbose: bool) {
    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_level);

    // RUST_LOG overrides the file filter
    let file_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let log_file = open_log_file();
    let log_path = log_file.as_ref().map(|(_, path)| path.clone());
    let file_layer = log_file.map(|(file, _)| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_filter(file_filter)
    });

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    // Bridge log crate events from dependencies to tracing
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize log-to-tracing bridge: {}", e);
    }

    if let Some(path) = log_path {
        tracing::debug!("Logging initialized to: {:?}", path);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::info!("aws-sso-helper {} starting", LONG_VERSION);

    let options = cli.into_options();
    let settings_file = SsoConfig::load_from_dir(&options.cache_dir()?);
    let settings = options.resolve(settings_file, ambient_region)?;
    tracing::info!(
        "Using start URL {} in region {} with client '{}'",
        settings.start_url,
        settings.region,
        settings.client_name
    );

    let service = AwsSsoService::new(&settings.region)?;

    let picker: Box<dyn Picker> = if std::io::stdin().is_terminal()
        && std::io::stderr().is_terminal()
    {
        Box::new(DialoguerPicker)
    } else {
        tracing::warn!("No terminal attached, interactive selections will be cancelled");
        Box::new(ScriptedPicker::cancelling())
    };
    let browser: Box<dyn BrowserLauncher> = if settings.no_browser {
        Box::new(NoBrowser)
    } else {
        Box::new(SystemBrowser)
    };

    let helper = SsoHelper::new(&service, picker.as_ref(), &SystemClock, browser.as_ref());
    let credentials = helper.get_credentials(&settings)?;

    if credentials.is_empty() {
        tracing::info!("No credentials produced");
    }

    let output = render(&credentials, settings.output, settings.pass_thru)?;
    if !output.is_empty() {
        println!("{}", output);
    }

    Ok(())
}
