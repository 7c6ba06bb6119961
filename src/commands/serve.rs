use crate::args::ServeArgs;
use crate::commands::Out;
use crate::{server, Config, Result};

/// Runs the HTTP API over the home's database until Ctrl-C.
///
/// # Errors
/// - `ErrorType::Service` if the address cannot be bound or the server fails.
pub async fn serve(config: Config, args: ServeArgs) -> Result<Out<()>> {
    let bind = args.bind().unwrap_or_else(|| config.bind());
    server::serve(config.tracker(), bind).await?;
    Ok("The HTTP API has shut down".into())
}
