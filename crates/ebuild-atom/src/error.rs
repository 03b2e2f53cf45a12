use thiserror::Error;

/// Error type for atom, version and dependency string parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtomError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),

    #[error("Invalid package name \"{0}\"")]
    InvalidCpv(String),

    #[error("Invalid atom \"{atom}\": {reason}")]
    InvalidAtom { atom: String, reason: String },

    #[error("Atom \"{0}\" carries a version but no operator")]
    MissingOperator(String),

    #[error("Invalid operator \"{0}\"")]
    InvalidOperator(String),

    #[error("USE conditional \"{0}\" is not supported in dependency strings")]
    UseConditional(String),

    #[error("Unbalanced parenthesis in dependency string \"{0}\"")]
    Unbalanced(String),

    #[error("Expected \"(\" after \"||\" in dependency string \"{0}\"")]
    DanglingAnyOf(String),
}

impl AtomError {
    pub(crate) fn invalid_atom(atom: &str, reason: impl Into<String>) -> Self {
        AtomError::InvalidAtom {
            atom: atom.to_string(),
            reason: reason.into(),
        }
    }
}
