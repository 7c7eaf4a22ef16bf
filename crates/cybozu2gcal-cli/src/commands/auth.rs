//! The `auth` command.

use std::path::Path;

use cybozu2gcal_core::{CLIENT_SECRET_FILE, TOKEN_FILE};
use cybozu2gcal_providers::google::{GoogleConfig, OAuthClient, OAuthCredentials, TokenStorage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::cli::AuthArgs;
use crate::error::{CliError, CliResult};

/// Runs the paste-the-code OAuth flow and saves the token.
///
/// Reads `client_secret.json` from the config directory, prints the consent
/// URL, and waits for the redirected address (or the bare code) on stdin.
pub async fn google(args: &AuthArgs, config_dir: &Path) -> CliResult<()> {
    let credentials = OAuthCredentials::from_file(config_dir.join(CLIENT_SECRET_FILE))?;
    let config = GoogleConfig::new(credentials, config_dir.join(TOKEN_FILE));
    config.validate()?;

    let storage = TokenStorage::new(&config.token_path);
    if !args.force && storage.load()?.is_some_and(|t| t.has_scopes(&config.scopes)) {
        println!("Already authorized ({}).", storage.path().display());
        println!("Use --force to authorize again.");
        return Ok(());
    }

    let client = OAuthClient::new(config)?;
    let pending = client.begin_authorization();

    println!("Open this URL in a browser and grant access:");
    println!();
    println!("  {}", pending.url);
    println!();
    if !args.no_browser
        && let Err(e) = open::that(&pending.url)
    {
        debug!("could not open a browser: {}", e);
    }
    println!("The browser then lands on an http://localhost address that fails to load.");
    println!("Paste that address (or just its code parameter) here:");

    let answer = read_line().await?;
    let tokens = client.complete_authorization(&pending, &answer).await?;
    storage.save(&tokens)?;

    info!("authorization saved");
    println!();
    println!("Authorized. Token saved to {}", storage.path().display());
    Ok(())
}

async fn read_line() -> CliResult<String> {
    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    if read == 0 {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "no authorization code entered",
        )));
    }
    Ok(line.trim().to_string())
}
