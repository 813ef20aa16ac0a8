use thiserror::Error;

/// Every error kind the core can surface to a caller.
///
/// Reads never mutate state; the only automatic recovery is the `saveModule`
/// rollback, which is handled by the registry core itself and never reaches
/// callers as a distinct error (rollback failures are logged and swallowed).
#[derive(Error, Debug)]
pub enum TddbError {
    #[error("no such module: {module}")]
    NoSuchModule { module: String },

    #[error("no such type: {module}.{name}{}", version.as_deref().map(|v| format!("-{v}")).unwrap_or_default())]
    NoSuchType {
        module: String,
        name: String,
        version: Option<String>,
    },

    #[error("no such function: {module}.{name}{}", version.as_deref().map(|v| format!("-{v}")).unwrap_or_default())]
    NoSuchFunc {
        module: String,
        name: String,
        version: Option<String>,
    },

    #[error("user {user} lacks required privilege on module {module}: {required}")]
    NoSuchPrivilege {
        user: String,
        module: String,
        required: &'static str,
    },

    #[error("spec parse error: {message}")]
    SpecParseError { message: String },

    #[error("type storage error: {0}")]
    TypeStorageError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("bad JSON schema document for {module}.{name}: {source}")]
    BadJsonSchemaDocument {
        module: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("deadlock suspected acquiring {kind} lock on module {module} after {waited_ms}ms")]
    DeadlockSuspected {
        module: String,
        kind: &'static str,
        waited_ms: u64,
    },

    #[error(
        "concurrent modification of module {module}: expected previous version {expected}, found {actual}"
    )]
    ConcurrentModification {
        module: String,
        expected: String,
        actual: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TddbError {
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        TddbError::TypeStorageError(Box::new(source))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        TddbError::SpecParseError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TddbError>;
