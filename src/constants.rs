// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JPEG quality steps used for injected photos
///
/// Injection encodes at `Full` first and retries once at `Reduced` when the
/// result does not fit the receiving buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JpegQuality {
    /// First attempt
    #[default]
    Full,
    /// Single retry after an oversized result
    Reduced,
}

impl JpegQuality {
    /// Encoding attempts in order
    pub const ALL: [JpegQuality; 2] = [JpegQuality::Full, JpegQuality::Reduced];

    /// Quality value passed to the JPEG encoder (0-100)
    pub fn value(&self) -> u8 {
        match self {
            JpegQuality::Full => 92,
            JpegQuality::Reduced => 50,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            JpegQuality::Full => "Full",
            JpegQuality::Reduced => "Reduced",
        }
    }
}

/// Compositor thread bounded waits
pub mod compositor {
    use super::Duration;

    /// Maximum wait for graphics context creation on the compositor thread
    pub const INIT_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Maximum wait for a synchronous readback
    pub const CAPTURE_TIMEOUT: Duration = Duration::from_millis(2000);

    /// Maximum wait for the compositor thread to shut down
    pub const RELEASE_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Off-screen surface size of the relay channel
    pub const RELAY_PBUFFER_SIZE: (u32, u32) = (1, 1);

    /// Log every Nth drawn frame
    pub const FRAME_LOG_INTERVAL: u64 = 100;
}

/// Photo injection timings and sizes
pub mod photo {
    use super::Duration;

    /// Delay between request finalization and injection on the session path
    pub const INJECTION_DELAY: Duration = Duration::from_millis(100);

    /// Reader queue depth of the image writer
    pub const WRITER_QUEUE_DEPTH: usize = 2;

    /// Output size when the session path does not know the reader size
    pub const SESSION_DEFAULT_SIZE: (u32, u32) = (1280, 720);

    /// Output size when the legacy path does not know the preview size
    pub const LEGACY_DEFAULT_SIZE: (u32, u32) = (640, 480);
}

/// Configuration file handling
pub mod config {
    use super::Duration;

    /// Settings file name inside the config directory
    pub const FILE_NAME: &str = "cs_config.json";

    /// Environment override for the config directory
    pub const DIR_ENV: &str = "CAMSWAP_CONFIG_DIR";

    /// Application directory name under the platform config dir
    pub const APP_DIR: &str = "camswap";

    /// Minimum interval between two non-forced reloads
    pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(1000);

    /// Quiet period after a settings file event before it is reloaded
    pub const EVENT_SETTLE: Duration = Duration::from_millis(100);
}

/// Substitute media files
pub mod media {
    use super::Duration;

    /// Video file extensions recognized in the media directory
    pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

    /// Fallback file name when no selection is configured
    pub const DEFAULT_VIDEO_NAME: &str = "Cam.mp4";

    /// Maximum wait for a decoded sample
    pub const SAMPLE_TIMEOUT: Duration = Duration::from_millis(500);

    /// Maximum wait for a pipeline to preroll
    pub const PREROLL_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Platform levels at which the session-creation shapes appeared
pub mod platform {
    /// Plain surface list and high-speed sessions
    pub const LEVEL_SURFACE_LIST: u32 = 21;

    /// Reprocessable sessions
    pub const LEVEL_REPROCESSABLE: u32 = 23;

    /// Output configuration lists
    pub const LEVEL_OUTPUT_CONFIGURATIONS: u32 = 24;

    /// Single session configuration object
    pub const LEVEL_SESSION_CONFIGURATION: u32 = 28;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_quality_order() {
        let values: Vec<u8> = JpegQuality::ALL.iter().map(|q| q.value()).collect();
        assert_eq!(values, vec![92, 50]);
    }

    #[test]
    fn test_timeouts_are_ordered() {
        assert!(compositor::RELEASE_TIMEOUT < compositor::CAPTURE_TIMEOUT);
        assert!(compositor::CAPTURE_TIMEOUT < compositor::INIT_TIMEOUT);
    }
}
