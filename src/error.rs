use std::fmt;

/// Request-level failures. Everything scoped to a single record is
/// absorbed and logged inside the engine; only an unusable
/// configuration (or a failure to serialize the finished document)
/// reaches the caller.
#[derive(Debug)]
pub enum BadgePressError {
    TemplateLoad(String),
    FontLoad(String),
    InvalidConfiguration(String),
    Pdf(String),
    Cancelled,
    Io(std::io::Error),
}

impl fmt::Display for BadgePressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadgePressError::TemplateLoad(message) => {
                write!(f, "template load failed: {}", message)
            }
            BadgePressError::FontLoad(message) => write!(f, "font load failed: {}", message),
            BadgePressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            BadgePressError::Pdf(message) => write!(f, "pdf serialization failed: {}", message),
            BadgePressError::Cancelled => write!(f, "render request cancelled"),
            BadgePressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for BadgePressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BadgePressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BadgePressError {
    fn from(value: std::io::Error) -> Self {
        BadgePressError::Io(value)
    }
}
