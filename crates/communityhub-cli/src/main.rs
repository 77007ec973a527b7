//! CommunityHub admin console.
//!
//! A line-oriented console for the CommunityHub admin dashboard: sign in,
//! look at communities and members, and manage the reseller network.

mod app;

use std::io;

use anyhow::{bail, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use communityhub_core::auth::CredentialStore;
use communityhub_core::config::Config;

use app::App;

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes buffered log lines and must outlive `main`'s work.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--store-admin-secret") => return store_admin_secret(args.get(2)),
        Some("--forget-admin-secret") => return forget_admin_secret(args.get(2)),
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some(other) => bail!("Unknown argument '{}'. Try --help.", other),
        None => {}
    }

    info!("CommunityHub console starting");

    let mut app = App::new().await?;
    let result = app.run().await;
    app.shutdown().await;

    info!("CommunityHub console exiting");
    result
}

fn print_usage() {
    println!("Usage: communityhub [OPTION]");
    println!();
    println!("  --store-admin-secret [email]   Save the local admin secret in the OS keychain");
    println!("  --forget-admin-secret [email]  Remove the saved local admin secret");
    println!("  -h, --help                     Show this help");
    println!();
    println!("With no option, starts the interactive console.");
}

/// Email the privileged secret is filed under: argument, then config.
fn admin_identifier(arg: Option<&String>) -> Result<String> {
    if let Some(id) = arg {
        return Ok(id.clone());
    }
    let config = Config::load()?;
    match config.admin_identifier {
        Some(id) => Ok(id),
        None => bail!(
            "No admin email given. Pass one, or set {}.",
            communityhub_core::config::ENV_ADMIN_EMAIL
        ),
    }
}

fn store_admin_secret(arg: Option<&String>) -> Result<()> {
    let identifier = admin_identifier(arg)?;

    println!("Storing local admin secret for {}", identifier);
    let secret = rpassword::prompt_password("Secret: ")?;
    if secret.is_empty() {
        bail!("Secret must not be empty");
    }
    let confirm = rpassword::prompt_password("Confirm: ")?;
    if secret != confirm {
        bail!("Secrets do not match");
    }

    CredentialStore::new().store(&identifier, &secret)?;
    println!("Saved.");
    Ok(())
}

fn forget_admin_secret(arg: Option<&String>) -> Result<()> {
    let identifier = admin_identifier(arg)?;
    if CredentialStore::new().delete(&identifier)? {
        println!("Removed.");
    } else {
        println!("No saved secret for {}.", identifier);
    }
    Ok(())
}
