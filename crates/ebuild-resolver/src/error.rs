use ebuild_atom::AtomError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    // Parsing errors
    #[error(transparent)]
    Atom(#[from] AtomError),

    #[error("Invalid package {cpv}: {reason}")]
    InvalidPackage { cpv: String, reason: String },

    // Repository loading errors
    #[error("Failed to parse repository: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Slot bookkeeping errors
    #[error("{0} is not slotted")]
    UnknownSlotting(String),

    #[error("Blocker {0} is not registered")]
    UnknownLimiter(String),

    #[error("Package {0} has no choice binding")]
    UnknownBinding(String),

    // Choice point errors
    #[error("Choice point for {0} has no candidates left")]
    NoCandidate(String),

    // Plan errors
    #[error("Nothing installed matches {0}")]
    NothingToRemove(String),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
