use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};

use thiserror::Error;

use crate::sync::SyncError;

pub type RestResult<T> = Result<T, RestError>;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Failed to authenticate")]
    FailedToAuthenticate(#[source] anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Email service error: {0}")]
    Upstream(String),

    #[error("Internal Server Error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<SyncError> for RestError {
    fn from(e: SyncError) -> Self {
        use SyncError as E;
        match e {
            E::UserNotFound(user) => Self::NotFound(user),
            E::InvalidSource(_) | E::UnknownList(_) | E::InvalidEmail(_) => {
                Self::ParseError(e.to_string())
            }
            E::Suppressed(_) => Self::Conflict(e.to_string()),
            E::RemoteProtocol(_) | E::RemoteCall(_) | E::NoMergeVars(_) | E::PartialFailure { .. } => {
                Self::Upstream(e.to_string())
            }
            E::Deferral(_) | E::Store(_) => {
                tracing::error!("Synchronization failed: {}", e);
                Self::InternalError("Synchronization failed".into())
            }
        }
    }
}

impl ResponseError for RestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ParseError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::FailedToAuthenticate(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        if let Self::FailedToAuthenticate(_) = self {
            response.insert_header((header::WWW_AUTHENTICATE, r#"Basic realm="admin""#));
        }
        response.body(self.to_string())
    }
}
