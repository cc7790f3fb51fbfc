use scout_domain::ProtocolViolation;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Authentication failed: {message}")]
	Auth { message: String },
	#[error("Operation was cancelled.")]
	Cancelled,
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error(transparent)]
	Protocol(#[from] ProtocolViolation),
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Task panicked: {message}")]
	Panicked { message: String },
}
impl Error {
	pub fn is_auth(&self) -> bool {
		matches!(self, Self::Auth { .. })
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

impl From<scout_providers::Error> for Error {
	fn from(err: scout_providers::Error) -> Self {
		match err {
			scout_providers::Error::Auth { .. } => Self::Auth { message: err.to_string() },
			scout_providers::Error::Cancelled => Self::Cancelled,
			other => Self::Provider { message: other.to_string() },
		}
	}
}

impl From<scout_storage::Error> for Error {
	fn from(err: scout_storage::Error) -> Self {
		match err {
			scout_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
