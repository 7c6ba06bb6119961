use crate::commands::Out;
use crate::{Config, Result};
use std::net::SocketAddr;
use std::path::Path;

/// Creates the data directory, an initial `config.json` and an empty database.
///
/// # Arguments
/// - `home` - The directory that will be the root of data directory, e.g. `$HOME/money-monitor`
/// - `bind` - The address the HTTP API will listen on, if not the default.
///
/// # Errors
/// - `ErrorType::Config` if any file operation fails or the home is already initialized.
pub async fn init(home: &Path, bind: Option<SocketAddr>) -> Result<Out<()>> {
    let config = Config::create(home, bind)
        .await
        .map_err(|e| e.context("Unable to create the data directory and configs"))?;
    Ok(format!(
        "Successfully created the money-monitor directory at '{}'",
        config.root().display()
    )
    .into())
}
