use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Fatal at startup. The widget cannot run without a store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("store URL is not configured")]
    MissingStoreUrl,
    #[error("store access key is not configured")]
    MissingStoreKey,
    #[error("invalid store URL `{url}`: {reason}")]
    InvalidStoreUrl { url: String, reason: String },
    #[error("database URL is not configured")]
    MissingDatabaseUrl,
    #[error("scheduler id must not be empty")]
    MissingSchedulerId,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("backend `{0}` is not compiled into this binary")]
    UnsupportedBackend(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to store failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store responded with {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("store rejected the row: {0}")]
    Conflict(String),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scheduler session is not initialized")]
    NotInitialized,
    #[error("booking belongs to scheduler `{booking}`, session is `{session}`")]
    SchedulerMismatch { booking: String, session: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("no slot is selected")]
    NoSlotSelected,
    #[error("slot {0} is already booked")]
    SlotTaken(String),
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("invalid booking details: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("slot {0} does not exist")]
    UnknownSlot(String),
    #[error("slot {0} offers no action to this user")]
    ActionUnavailable(String),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSlot(_) => StatusCode::NOT_FOUND,
            ApiError::ActionUnavailable(_) => StatusCode::CONFLICT,
            ApiError::Form(FormError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Form(FormError::SlotTaken(_) | FormError::AlreadySubmitting) => {
                StatusCode::CONFLICT
            }
            ApiError::Form(FormError::NoSlotSelected) => StatusCode::BAD_REQUEST,
            ApiError::Form(FormError::Session(err)) | ApiError::Session(err) => {
                session_status(err)
            }
        };

        (status, self.to_string()).into_response()
    }
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::SchedulerMismatch { .. } => StatusCode::BAD_REQUEST,
        SessionError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        SessionError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        SessionError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}
