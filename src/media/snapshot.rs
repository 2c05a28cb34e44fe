// SPDX-License-Identifier: GPL-3.0-only

//! Decode a single frame of the substitute media at a playback position

use super::frame::VideoFrame;
use crate::constants::media::PREROLL_TIMEOUT;
use crate::errors::MediaError;
use gstreamer::prelude::*;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Produces a still frame of a media file
pub trait FrameSnapshotter: Send + Sync {
    fn frame_at(&self, path: &Path, position: Duration) -> Result<VideoFrame, MediaError>;
}

/// Snapshotter using a temporary GStreamer pipeline per call
#[derive(Debug, Default, Clone, Copy)]
pub struct GstSnapshotter;

fn extraction_pipeline(
    path: &Path,
) -> Result<(gstreamer::Pipeline, gstreamer_app::AppSink), MediaError> {
    gstreamer::init()?;

    let description = format!(
        "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGBA ! \
         appsink name=sink max-buffers=1 drop=true sync=false",
        path.to_string_lossy()
    );

    let pipeline = gstreamer::parse::launch(&description)
        .map_err(|e| MediaError::SnapshotFailed(e.to_string()))?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| MediaError::SnapshotFailed("not a pipeline".into()))?;

    let appsink = pipeline
        .by_name("sink")
        .ok_or_else(|| MediaError::SnapshotFailed("appsink missing".into()))?
        .downcast::<gstreamer_app::AppSink>()
        .map_err(|_| MediaError::SnapshotFailed("sink is not an appsink".into()))?;

    Ok((pipeline, appsink))
}

fn wait_for_async_done(pipeline: &gstreamer::Pipeline) -> Result<(), MediaError> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| MediaError::SnapshotFailed("pipeline has no bus".into()))?;
    let deadline = std::time::Instant::now() + PREROLL_TIMEOUT;

    while std::time::Instant::now() < deadline {
        if let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(100)) {
            use gstreamer::MessageView;
            match msg.view() {
                MessageView::Error(err) => {
                    return Err(MediaError::SnapshotFailed(err.error().to_string()));
                }
                MessageView::AsyncDone(_) => return Ok(()),
                _ => {}
            }
        }
    }
    Err(MediaError::SnapshotFailed("preroll timed out".into()))
}

fn pull_frame(
    pipeline: &gstreamer::Pipeline,
    appsink: &gstreamer_app::AppSink,
    position: Duration,
) -> Result<VideoFrame, MediaError> {
    pipeline.set_state(gstreamer::State::Paused)?;
    wait_for_async_done(pipeline)?;

    // ACCURATE lands on the closest frame rather than the previous keyframe
    let target = gstreamer::ClockTime::from_nseconds(position.as_nanos() as u64);
    if let Err(e) = pipeline.seek_simple(
        gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::ACCURATE,
        target,
    ) {
        warn!(?e, "Snapshot seek failed, using first frame");
    }

    let sample = appsink
        .try_pull_preroll(gstreamer::ClockTime::from_seconds(3))
        .ok_or_else(|| MediaError::SnapshotFailed("no frame at position".into()))?;

    let caps = sample
        .caps()
        .ok_or_else(|| MediaError::SnapshotFailed("sample has no caps".into()))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| MediaError::SnapshotFailed(e.to_string()))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| MediaError::SnapshotFailed("sample has no buffer".into()))?;
    let map = buffer
        .map_readable()
        .map_err(|_| MediaError::SnapshotFailed("buffer not readable".into()))?;

    let row_bytes = info.width() as usize * 4;
    let stride = info.stride().first().copied().unwrap_or(row_bytes as i32) as usize;
    let mut data = Vec::with_capacity(row_bytes * info.height() as usize);
    for row in map.as_slice().chunks(stride.max(1)).take(info.height() as usize) {
        data.extend_from_slice(row.get(..row_bytes).unwrap_or(row));
    }

    VideoFrame::from_rgba(info.width(), info.height(), data, 0)
        .map(|frame| frame.with_pts(position))
        .ok_or_else(|| MediaError::SnapshotFailed("short frame buffer".into()))
}

impl FrameSnapshotter for GstSnapshotter {
    fn frame_at(&self, path: &Path, position: Duration) -> Result<VideoFrame, MediaError> {
        debug!(path = %path.display(), ?position, "Snapshot of substitute media");
        if !path.is_file() {
            return Err(MediaError::NoSource);
        }

        let (pipeline, appsink) = extraction_pipeline(path)?;
        let result = pull_frame(&pipeline, &appsink, position);
        let _ = pipeline.set_state(gstreamer::State::Null);
        result
    }
}
