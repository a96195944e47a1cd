//! `reelsync list-users`

use std::io::{self, Write};
use std::time::Duration;

use reelsync_config::Config;
use reelsync_recon::WatchSource;

use crate::fetch::{resolve_token, PlexClient};
use crate::CliError;

/// Build a Plex client from flag + config, failing with a config error when
/// no token is available anywhere.
pub(crate) fn plex_client(config: &Config, flag: Option<String>) -> Result<PlexClient, CliError> {
    let token = match resolve_token(flag, config.plex.token.as_deref()) {
        Some(token) => token,
        None => config.plex.require_token()?.to_string(),
    };
    let client = PlexClient::new(
        &config.plex.url,
        token,
        Duration::from_secs(config.plex.timeout),
    )?;
    Ok(client)
}

pub fn cmd_list_users(config: &Config, plex_token: Option<String>) -> Result<(), CliError> {
    let client = plex_client(config, plex_token)?;
    let accounts = client.accounts()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if accounts.is_empty() {
        writeln!(out, "No accounts found on {}", config.plex.url)?;
        return Ok(());
    }
    let width = accounts.iter().map(|a| a.id.len()).max().unwrap_or(0);
    for account in &accounts {
        writeln!(out, "{:>width$}  {}", account.id, account.name)?;
    }
    Ok(())
}
