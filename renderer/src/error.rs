use curly::CompileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("unknown presenter `{0}`")]
    UnknownPresenter(String),

    #[error("presenter `{presenter}` does not implement `{method}`")]
    Unimplemented { presenter: String, method: String },

    /// Raised by a presenter operation while rendering.
    #[error("component `{method}` failed: {message}")]
    Component { method: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl RenderError {
    pub fn component(method: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Component {
            method: method.into(),
            message: message.into(),
        }
    }
}
