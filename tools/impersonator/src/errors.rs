use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImpersonatorError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    MethodInvocation(#[from] MethodInvocationError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("target error: {0}")]
    Target(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("cli error: {0}")]
    Cli(String),
}

impl ImpersonatorError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_method_invocation(&self) -> bool {
        matches!(self, Self::MethodInvocation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Replay-time correctness failures. `expected`/`received` hold rendered
/// method descriptors such as `sum(1, 2) {with block}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodInvocationError {
    #[error("unexpected method invocation received: {received} (no more recorded invocations)")]
    Unexpected { received: String },
    #[error("expecting:\n  {expected}\nbut received:\n  {received}")]
    Mismatch { expected: String, received: String },
    #[error("expecting {count} method invocations that didn't happen: [{}]", .pending.join(", "))]
    Unconsumed { count: usize, pending: Vec<String> },
}
