use thiserror::Error;
use crate::value::ContainerKind;

/// Everything that can go wrong when reading or writing reactive state.
///
/// Most variants are programming errors (wrong decorator usage) which surface
/// immediately from the call that caused them.
#[derive(Debug, Error)]
pub enum StateError {
    /// V1 (PU) or V2 state read while the parameters of a V2 component are evaluated
    /// from a V1 parent.
    #[error("'{property}': V1 and V2 state must not be mixed when initializing a V2 component")]
    IllegalV1V2Access { property: String },
    /// A `@Computed` function changed observed state.
    #[error("'{property}': state must not be changed inside a @Computed function")]
    MutationInComputed { property: String },
    #[error("'{name}' is a read-only {decorator}")]
    ReadOnly { name: String, decorator: &'static str },
    #[error("duplicate @Provide '{0}'")]
    DuplicateProvide(String),
    #[error("no @Provide found for @Consume '{0}'")]
    MissingProvider(String),
    #[error("'{name}': unsupported value for a reactive variable ({reason})")]
    UnsupportedValue { name: String, reason: &'static str },
    #[error("expected an observed container, found {0}")]
    NotObserved(&'static str),
    #[error("expected {expected} but the target is {found}")]
    WrongContainer { expected: ContainerKind, found: ContainerKind },
    #[error("json: expected {expected} but found {found}")]
    JsonTypeMismatch { expected: &'static str, found: String },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("json: cyclic structure can not be serialized")]
    CyclicValue,
    #[error("unknown storage property '{0}'")]
    UnknownProperty(String),
    #[error("the runtime has been dropped")]
    RuntimeGone,
    /// Raised by application callbacks (`@Computed`, `@Monitor`, update functions).
    #[error("{0}")]
    Application(String),
}

pub type Result<T, E = StateError> = std::result::Result<T, E>;

impl StateError {
    pub fn app(message: impl Into<String>) -> Self {
        StateError::Application(message.into())
    }
}
