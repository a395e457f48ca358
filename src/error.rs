//! Error types shared by the object model and the terminal runtime.

use std::io;
use thiserror::Error;

/// Operation slots a class descriptor may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Display,
    Delete,
    Compare,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Display => "display",
            Capability::Delete => "delete",
            Capability::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// A dispatch was attempted on a class that does not define the slot.
///
/// This is a construction-time mistake: the panicking dispatch helpers
/// turn it into a panic, the `try_*` variants hand it back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("class `{class}` does not implement `{capability}`")]
pub struct MissingCapability {
    pub class: &'static str,
    pub capability: Capability,
}

#[derive(Error, Debug)]
pub enum CrtError {
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Terminal runtime already initialized in this process")]
    AlreadyInitialized,

    #[error("Standard input is not a terminal")]
    NotATerminal,
}

pub type Result<T> = std::result::Result<T, CrtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_capability_message() {
        let err = MissingCapability {
            class: "Meter",
            capability: Capability::Compare,
        };
        assert_eq!(err.to_string(), "class `Meter` does not implement `compare`");
    }
}
