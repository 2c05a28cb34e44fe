// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camswap::JpegQuality;
use camswap::constants::{compositor, photo};

#[test]
fn test_jpeg_quality_values() {
    // Full quality first, one reduced retry
    assert_eq!(JpegQuality::ALL.len(), 2);
    assert_eq!(JpegQuality::Full.value(), 92);
    assert_eq!(JpegQuality::Reduced.value(), 50);
}

#[test]
fn test_jpeg_quality_display_names() {
    for quality in JpegQuality::ALL {
        assert!(!quality.display_name().is_empty());
    }
}

#[test]
fn test_compositor_bounds_ordered() {
    // Init waits longest, release shortest
    assert!(compositor::INIT_TIMEOUT > compositor::CAPTURE_TIMEOUT);
    assert!(compositor::CAPTURE_TIMEOUT > compositor::RELEASE_TIMEOUT);
}

#[test]
fn test_photo_default_sizes() {
    assert_eq!(photo::SESSION_DEFAULT_SIZE, (1280, 720));
    assert_eq!(photo::LEGACY_DEFAULT_SIZE, (640, 480));
    assert_eq!(photo::WRITER_QUEUE_DEPTH, 2);
}
