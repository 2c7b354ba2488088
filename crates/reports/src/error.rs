use agentdesk_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid mail address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

agentdesk_common::impl_context!();
