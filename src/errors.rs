// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture virtualization layer
//!
//! Each subsystem owns an error enum. None of these ever cross back into a
//! host-triggered call path: interception points log them and fall back.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Compositor (render / relay channel) errors
    Compositor(CompositorError),
    /// Decoder and media source errors
    Media(MediaError),
    /// Photo production and injection errors
    Photo(PhotoError),
    /// Interception layer errors
    Capture(CaptureError),
    /// Configuration errors
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Compositor errors
///
/// Every variant is an initialization or per-frame failure that makes the
/// channel report `not initialized` or skip a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositorError {
    /// Target surface has no usable pixel size yet (not laid out)
    DegenerateTarget { width: u32, height: u32 },
    /// Target surface refused a graphics window attachment
    WindowRejected(String),
    /// Graphics context or device could not be created
    ContextCreation(String),
    /// Shader program failed to build
    ProgramLink(String),
    /// Texture allocation or upload failed
    Texture(String),
    /// Draw, present or readback failed
    Draw(String),
    /// Bounded wait on the compositor thread expired
    Timeout { operation: &'static str, millis: u64 },
    /// Channel was released or never initialized
    NotInitialized,
    /// Compositor thread is gone
    ThreadGone,
}

/// Media errors
#[derive(Debug, Clone, PartialEq)]
pub enum MediaError {
    /// No substitute media is configured or reachable
    NoSource,
    /// Source could not be opened
    OpenFailed(String),
    /// Synchronous prepare failed
    PrepareFailed(String),
    /// Player used in the wrong state
    InvalidState(&'static str),
    /// Frame snapshot failed
    SnapshotFailed(String),
    /// GStreamer pipeline error
    Pipeline(String),
}

/// Photo production and injection errors
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoError {
    /// No production tier produced an image
    NoImage,
    /// Encoding failed
    EncodingFailed(String),
    /// Encoded image does not fit the receiving buffer, even after re-encode
    TooLarge { size: usize, capacity: usize },
    /// No writable image slot in the reader queue
    QueueFull,
    /// Target has no image queue to inject into
    NotAReader,
}

/// Interception layer errors
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Forwarded platform call failed
    Platform(String),
    /// Session argument at the interception position has the wrong kind
    UnexpectedArgument { index: usize, expected: &'static str },
    /// Session state machine rejected a transition
    InvalidTransition { from: &'static str, to: &'static str },
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Config file could not be read or written
    Io(String),
    /// Config file is not valid JSON for the settings schema
    Parse(String),
    /// No config directory could be determined
    NoConfigDir,
    /// The settings directory could not be watched
    Watch(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Compositor(e) => write!(f, "Compositor error: {}", e),
            AppError::Media(e) => write!(f, "Media error: {}", e),
            AppError::Photo(e) => write!(f, "Photo error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::DegenerateTarget { width, height } => {
                write!(f, "Target surface is degenerate ({}x{})", width, height)
            }
            CompositorError::WindowRejected(msg) => {
                write!(f, "Target rejected window attachment: {}", msg)
            }
            CompositorError::ContextCreation(msg) => {
                write!(f, "Graphics context creation failed: {}", msg)
            }
            CompositorError::ProgramLink(msg) => write!(f, "Program link failed: {}", msg),
            CompositorError::Texture(msg) => write!(f, "Texture error: {}", msg),
            CompositorError::Draw(msg) => write!(f, "Draw failed: {}", msg),
            CompositorError::Timeout { operation, millis } => {
                write!(f, "{} timed out after {} ms", operation, millis)
            }
            CompositorError::NotInitialized => write!(f, "Channel is not initialized"),
            CompositorError::ThreadGone => write!(f, "Compositor thread has exited"),
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::NoSource => write!(f, "No substitute media available"),
            MediaError::OpenFailed(msg) => write!(f, "Failed to open media: {}", msg),
            MediaError::PrepareFailed(msg) => write!(f, "Failed to prepare media: {}", msg),
            MediaError::InvalidState(state) => write!(f, "Player is in invalid state: {}", state),
            MediaError::SnapshotFailed(msg) => write!(f, "Snapshot failed: {}", msg),
            MediaError::Pipeline(msg) => write!(f, "Pipeline error: {}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::NoImage => write!(f, "No image could be produced"),
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::TooLarge { size, capacity } => write!(
                f,
                "Encoded image ({} bytes) exceeds buffer capacity ({} bytes)",
                size, capacity
            ),
            PhotoError::QueueFull => write!(f, "No writable image slot available"),
            PhotoError::NotAReader => write!(f, "Target has no image queue"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Platform(msg) => write!(f, "Platform call failed: {}", msg),
            CaptureError::UnexpectedArgument { index, expected } => {
                write!(f, "Argument {} is not a {}", index, expected)
            }
            CaptureError::InvalidTransition { from, to } => {
                write!(f, "Invalid session transition {} -> {}", from, to)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
            ConfigError::Watch(msg) => write!(f, "Watch error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CompositorError {}
impl std::error::Error for MediaError {}
impl std::error::Error for PhotoError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for ConfigError {}

impl From<CompositorError> for AppError {
    fn from(err: CompositorError) -> Self {
        AppError::Compositor(err)
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        AppError::Media(err)
    }
}

impl From<PhotoError> for AppError {
    fn from(err: PhotoError) -> Self {
        AppError::Photo(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<::notify::Error> for ConfigError {
    fn from(err: ::notify::Error) -> Self {
        ConfigError::Watch(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<image::ImageError> for PhotoError {
    fn from(err: image::ImageError) -> Self {
        PhotoError::EncodingFailed(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for MediaError {
    fn from(err: gstreamer::glib::Error) -> Self {
        MediaError::Pipeline(err.to_string())
    }
}

impl From<gstreamer::glib::BoolError> for MediaError {
    fn from(err: gstreamer::glib::BoolError) -> Self {
        MediaError::Pipeline(err.to_string())
    }
}

impl From<gstreamer::StateChangeError> for MediaError {
    fn from(err: gstreamer::StateChangeError) -> Self {
        MediaError::Pipeline(format!("state change failed: {:?}", err))
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compositor_timeout_display() {
        let err = CompositorError::Timeout {
            operation: "capture_frame",
            millis: 2000,
        };
        assert_eq!(err.to_string(), "capture_frame timed out after 2000 ms");
    }

    #[test]
    fn test_app_error_from_photo() {
        let err: AppError = PhotoError::TooLarge {
            size: 10,
            capacity: 5,
        }
        .into();
        assert!(err.to_string().starts_with("Photo error:"));
    }

    #[test]
    fn test_config_error_from_json() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ConfigError = parse.unwrap_err().into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
