use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse filter: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to install subscriber: {0}")]
    Install(#[from] SetGlobalDefaultError),
}
