use std::fmt;
use std::io;

/// Domain error surfaced by channel operations. The engine catches these
/// to drive the failure unlock path before handing them back to the
/// caller; anything that is not a `ChannelError` (i.e. a panic) passes
/// through the engine after the same unlock.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ChannelError {
    /// Plain domain failure with a message.
    Channel(String),
    /// Domain failure carrying an OS level error code. Semantically
    /// identical to `Channel` as far as the engine is concerned.
    LowLevel(String, i32),
}

impl ChannelError {
    /// The error reported by default operation bodies that a concrete
    /// channel chose not to implement.
    #[inline]
    pub fn unsupported() -> ChannelError {
        ChannelError::Channel("unsupported".to_string())
    }

    #[inline]
    pub fn message(&self) -> &str {
        match self {
            ChannelError::Channel(msg) => msg,
            ChannelError::LowLevel(msg, _) => msg,
        }
    }

    /// The OS error code, if this failure came from below.
    #[inline]
    pub fn os_code(&self) -> Option<i32> {
        match self {
            ChannelError::Channel(_) => None,
            ChannelError::LowLevel(_, code) => Some(*code),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChannelError::Channel(msg) => write!(f, "channel error: {}", msg),
            ChannelError::LowLevel(msg, code) => {
                write!(f, "channel error: {} (os code {})", msg, code)
            }
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(io_error: io::Error) -> Self {
        match io_error.raw_os_error() {
            Some(code) => ChannelError::LowLevel(io_error.to_string(), code),
            None => ChannelError::Channel(io_error.to_string()),
        }
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;
