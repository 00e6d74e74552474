use rdpgate_session::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudflareError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// Non-success envelope from the REST API
    #[error("Cloudflare API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CloudflareError> for ProviderError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::Api { status: 404, message } => ProviderError::NotFound(message),
            CloudflareError::Api { status, message } if status >= 500 => {
                ProviderError::Transport(format!("{}: {}", status, message))
            }
            CloudflareError::Api { status, message } => {
                ProviderError::Rejected(format!("{}: {}", status, message))
            }
            CloudflareError::Command {
                command,
                status,
                stderr,
            } => ProviderError::Command {
                command,
                status,
                stderr,
            },
            CloudflareError::Spawn { command, source } => ProviderError::Command {
                command,
                status: "not started".to_string(),
                stderr: source.to_string(),
            },
            CloudflareError::Http(e) => ProviderError::Transport(e.to_string()),
            CloudflareError::Parse(message) => ProviderError::Protocol(message),
            CloudflareError::Io(e) => ProviderError::Io(e),
        }
    }
}
