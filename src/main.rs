use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Input, Password};
use std::sync::Arc;

use procurement_client::auth::{AccessDecision, AuthSession, CredentialStore, SqliteStorage};
use procurement_client::config::{CliArgs, Command, Config};
use procurement_client::events::SessionEvent;
use procurement_client::http_client::ApiClient;
use procurement_client::models::{FormData, Payload};

#[tokio::main]
async fn main() -> Result<()> {
    // .env values become defaults for the env-backed flags
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = Config::from_args(&args)?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for payloads
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(base_url = %config.base_url, "Configuration loaded");

    let storage = SqliteStorage::open(&config.session_db_file).with_context(|| {
        format!(
            "Failed to open session database: {}",
            config.session_db_file.display()
        )
    })?;
    tracing::debug!("Session database: {}", config.session_db_file.display());

    let store = Arc::new(CredentialStore::new(Arc::new(storage), config.refresh_skew()));
    let api = Arc::new(ApiClient::new(&config, store)?);
    let session = AuthSession::new(api.clone());

    let mut events = api.events().subscribe();
    // Interactive login is this shell's login surface
    api.events()
        .set_on_login_surface(matches!(args.command, Command::Login { .. }));

    let result = run(&session, &api, args.command).await;

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SessionExpired { redirect_to } = event {
            eprintln!(
                "Your session has expired. Please sign in again (procure login) [{}]",
                redirect_to
            );
        }
    }

    result
}

async fn run(session: &AuthSession, api: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("Failed to read email")?,
            };
            let password: String = Password::new()
                .with_prompt("Password")
                .interact()
                .context("Failed to read password")?;

            let user = session.login(&email, &password).await?;
            println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
        }

        Command::Logout => {
            session.logout().await?;
            println!("Signed out");
        }

        Command::Whoami => {
            let user = session.fetch_current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }

        Command::Status => {
            let store = api.store();
            let snapshot = store.snapshot();
            println!("API:            {}", api.base_url());
            println!("Authenticated:  {}", store.is_authenticated());
            match snapshot.expires_at {
                Some(expires_at) => println!("Token expires:  {}", expires_at.to_rfc3339()),
                None => println!("Token expires:  -"),
            }
            println!("Expiring soon:  {}", store.is_expiring_soon());
            if let Some(user) = session.current_user().await {
                println!("User:           {} <{}> ({})", user.name, user.email, user.role);
            }
        }

        Command::ChangePassword => {
            let current: String = Password::new()
                .with_prompt("Current password")
                .interact()
                .context("Failed to read current password")?;
            let new: String = Password::new()
                .with_prompt("New password")
                .with_confirmation("Confirm new password", "Passwords do not match")
                .interact()
                .context("Failed to read new password")?;

            session.change_password(&current, &new).await?;
            println!("Password changed");
        }

        Command::Get { endpoint } => print_payload(api.get(&endpoint).await?),

        Command::Post { endpoint, body } => {
            print_payload(api.post(&endpoint, parse_body(body)?).await?)
        }

        Command::Put { endpoint, body } => {
            print_payload(api.put(&endpoint, parse_body(body)?).await?)
        }

        Command::Patch { endpoint, body } => {
            print_payload(api.patch(&endpoint, parse_body(body)?).await?)
        }

        Command::Delete { endpoint } => print_payload(api.delete(&endpoint).await?),

        Command::Upload {
            endpoint,
            file,
            field,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let form = FormData::new().file(field, file_name, data, None);
            print_payload(api.upload(&endpoint, form).await?)
        }

        Command::Download { endpoint, file } => {
            let written = api.download(&endpoint, &file).await?;
            println!("Saved {} bytes to {}", written, file.display());
        }

        Command::Access { roles } => {
            let allowed = if roles.is_empty() { None } else { Some(&roles[..]) };
            match session.check_page_access(allowed).await {
                AccessDecision::Granted => println!("granted"),
                AccessDecision::LoginRequired => {
                    anyhow::bail!("Not signed in (login at {})", api.events().login_path())
                }
                AccessDecision::Forbidden => anyhow::bail!("Access denied for this role"),
            }
        }
    }

    Ok(())
}

/// Inline JSON body; no body sends `{}`
fn parse_body(body: Option<String>) -> Result<serde_json::Value> {
    match body {
        Some(raw) => serde_json::from_str(&raw).context("Request body must be valid JSON"),
        None => Ok(serde_json::json!({})),
    }
}

fn print_payload(payload: Payload) {
    println!("{}", payload);
}
