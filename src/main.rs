//! sessiongate -- command-line driver for the authenticated transport.
//!
//! Loads configuration, opens the persisted session for the configured API
//! origin and runs a single command against it.

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sessiongate::config::Config;
use sessiongate::credentials::CredentialPair;
use sessiongate::pipeline::HttpMethod;
use sessiongate::session::Session;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

enum Command {
    Status,
    Login { access: String, refresh: String },
    Logout,
    Refresh,
    Request {
        method: HttpMethod,
        path: String,
        data: Option<String>,
    },
    Config,
}

struct CliArgs {
    config_path: PathBuf,
    config_from_flag: bool,
    command: Command,
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("Run with --help for usage information.");
    std::process::exit(1);
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("sessiongate.toml");
    let mut config_from_flag = false;
    let mut positional = Vec::new();
    let mut options: Vec<(String, String)> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                    config_from_flag = true;
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("sessiongate {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--access" | "--refresh" | "--data" => match args.next() {
                Some(value) => options.push((arg.clone(), value)),
                None => fail(&format!("{arg} requires a value")),
            },
            other if other.starts_with('-') => fail(&format!("Unknown argument: {other}")),
            _ => positional.push(arg),
        }
    }

    let option = |name: &str| {
        options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("status") => Command::Status,
        Some("login") => match (option("--access"), option("--refresh")) {
            (Some(access), Some(refresh)) => Command::Login { access, refresh },
            _ => fail("login requires --access <TOKEN> and --refresh <TOKEN>"),
        },
        Some("logout") => Command::Logout,
        Some("refresh") => Command::Refresh,
        Some("request") => {
            let method = match positional.next().map(|m| m.parse::<HttpMethod>()) {
                Some(Ok(method)) => method,
                Some(Err(e)) => fail(&e),
                None => fail("request requires <METHOD> <PATH>"),
            };
            let Some(path) = positional.next() else {
                fail("request requires <METHOD> <PATH>");
            };
            Command::Request {
                method,
                path,
                data: option("--data"),
            }
        }
        Some("config") => Command::Config,
        Some(other) => fail(&format!("Unknown command: {other}")),
    };

    CliArgs {
        config_path,
        config_from_flag,
        command,
    }
}

fn print_usage() {
    println!(
        "\
sessiongate {version} -- Authenticated API transport

USAGE:
    sessiongate [OPTIONS] [COMMAND]

COMMANDS:
    status                                 Show the stored session [default]
    login --access <TOKEN> --refresh <TOKEN>
                                           Store a credential pair
    logout                                 Clear the stored session
    refresh                                Exchange the refresh token now
    request <METHOD> <PATH> [--data <JSON>]
                                           Send an authenticated request
    config                                 Print effective settings

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: sessiongate.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    SESSIONGATE_CONFIG     Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = parse_args();

    // SESSIONGATE_CONFIG applies unless --config was given.
    let config_path = match std::env::var("SESSIONGATE_CONFIG") {
        Ok(path) if !cli.config_from_flag => PathBuf::from(path),
        _ => cli.config_path,
    };

    let config = Config::load(&config_path)?;
    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        base_url = %config.transport.base_url,
        "Starting sessiongate"
    );

    if let Command::Config = cli.command {
        for entry in config.settings_report() {
            let marker = if entry.overridden {
                format!("  (from {})", entry.env_var)
            } else {
                String::new()
            };
            println!("{} = {}{}", entry.key, entry.value, marker);
        }
        return Ok(());
    }

    let session = Session::from_config(config)?;

    match cli.command {
        Command::Status => print_status(&session),
        Command::Login { access, refresh } => {
            session.login(CredentialPair::new(access, refresh))?;
            println!("Logged in.");
            print_status(&session);
        }
        Command::Logout => {
            session.force_logout();
            println!("Logged out.");
        }
        Command::Refresh => {
            session.client().coordinator().refresh().await?;
            println!("Credentials refreshed.");
            print_status(&session);
        }
        Command::Request { method, path, data } => {
            let body = data
                .map(|d| serde_json::from_str::<serde_json::Value>(&d))
                .transpose()
                .context("--data is not valid JSON")?;
            let response = session
                .client()
                .make_request::<serde_json::Value>(method, &path, body)
                .await?;
            tracing::debug!(status = response.status, "Request succeeded");
            println!("{}", serde_json::to_string_pretty(&response.data)?);
        }
        Command::Config => {}
    }

    Ok(())
}

fn print_status(session: &Session) {
    println!("Storage:        {}", session.store().storage_name());
    if !session.is_authenticated() {
        println!("Authenticated:  no");
        return;
    }
    println!("Authenticated:  yes");

    let Some(claims) = session.current_user() else {
        println!("Claims:         (opaque token)");
        return;
    };
    if let Some(subject) = &claims.subject {
        println!("User id:        {subject}");
    }
    if let Some(email) = &claims.email {
        println!("Email:          {email}");
    }
    if let Some(role) = &claims.role {
        println!("Role:           {role}");
    }
    if let Some(exp) = claims.expires_at {
        let when = chrono::DateTime::from_timestamp(exp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| exp.to_string());
        let remaining = exp - chrono::Utc::now().timestamp();
        println!("Expires:        {when} ({remaining}s)");
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        // Set sessiongate crate to the configured level, dependencies to warn
        EnvFilter::new(format!("sessiongate={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
