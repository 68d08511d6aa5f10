use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebugAgentError {
    #[error("Failed binding debug agent to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed starting debug agent thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("No debug target with id '{0}'")]
    UnknownTarget(String),

    #[error("A debugger client is already attached")]
    SessionBusy,
}

impl IntoResponse for DebugAgentError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::UnknownTarget(_) => StatusCode::NOT_FOUND,
            Self::SessionBusy => StatusCode::CONFLICT,
            Self::Bind { .. } | Self::Thread(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
