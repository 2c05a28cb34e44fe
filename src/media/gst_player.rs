// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer media player
//!
//! Video is decoded to RGBA through an appsink and pumped into the output
//! sink by a dedicated thread. Audio, when unmuted, runs as a separate
//! best-effort pipeline so a file without an audio track still prerolls.

use super::frame::VideoFrame;
use super::player::{FrameSink, MediaPlayer, PlayerFactory};
use super::source::MediaSource;
use crate::constants::media::{PREROLL_TIMEOUT, SAMPLE_TIMEOUT};
use crate::errors::MediaError;
use gstreamer::prelude::*;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frames pumped across all players, for periodic logging
static FRAME_COUNT: AtomicU64 = AtomicU64::new(0);

enum SourceHandle {
    Fd(OwnedFd),
    Path(PathBuf),
}

impl SourceHandle {
    fn element(&self) -> String {
        match self {
            SourceHandle::Fd(fd) => format!("fdsrc fd={}", fd.as_raw_fd()),
            SourceHandle::Path(path) => {
                format!("filesrc location=\"{}\"", path.to_string_lossy())
            }
        }
    }
}

struct Pump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Player backed by a GStreamer decode pipeline
pub struct GstMediaPlayer {
    tag: String,
    source: Option<SourceHandle>,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: Option<gstreamer_app::AppSink>,
    audio: Option<gstreamer::Pipeline>,
    output: Option<Arc<dyn FrameSink>>,
    pump: Option<Pump>,
    looping: Arc<AtomicBool>,
    muted: bool,
    playing: bool,
}

impl GstMediaPlayer {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            source: None,
            pipeline: None,
            appsink: None,
            audio: None,
            output: None,
            pump: None,
            looping: Arc::new(AtomicBool::new(false)),
            muted: true,
            playing: false,
        }
    }

    fn build_video_pipeline(
        &self,
        source: &SourceHandle,
    ) -> Result<(gstreamer::Pipeline, gstreamer_app::AppSink), MediaError> {
        gstreamer::init()?;

        // sync=true paces frames at the media's native rate
        let description = format!(
            "{} ! decodebin ! queue ! videoconvert ! video/x-raw,format=RGBA ! \
             appsink name=videosink max-buffers=1 drop=true sync=true",
            source.element()
        );

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| MediaError::OpenFailed(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| MediaError::OpenFailed("not a pipeline".into()))?;

        let appsink = pipeline
            .by_name("videosink")
            .ok_or_else(|| MediaError::OpenFailed("appsink missing".into()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| MediaError::OpenFailed("videosink is not an appsink".into()))?;

        Ok((pipeline, appsink))
    }

    fn build_audio_pipeline(&self) -> Option<gstreamer::Pipeline> {
        // A descriptor shares its file offset; only path sources get audio
        let Some(SourceHandle::Path(path)) = &self.source else {
            debug!(tag = %self.tag, "Audio skipped for descriptor source");
            return None;
        };
        let description = format!(
            "filesrc location=\"{}\" ! decodebin ! queue ! audioconvert ! audioresample ! autoaudiosink",
            path.to_string_lossy()
        );
        match gstreamer::parse::launch(&description) {
            Ok(element) => element.downcast::<gstreamer::Pipeline>().ok(),
            Err(e) => {
                debug!(tag = %self.tag, error = %e, "No audio pipeline");
                None
            }
        }
    }

    fn stop_audio(&mut self) {
        if let Some(audio) = self.audio.take() {
            let _ = audio.set_state(gstreamer::State::Null);
        }
    }

    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop.store(true, Ordering::SeqCst);
            if pump.handle.join().is_err() {
                warn!(tag = %self.tag, "Frame pump panicked");
            }
        }
    }
}

/// Block until the pipeline prerolls or reports an error
fn wait_for_preroll(pipeline: &gstreamer::Pipeline) -> Result<(), MediaError> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| MediaError::PrepareFailed("pipeline has no bus".into()))?;
    let deadline = std::time::Instant::now() + PREROLL_TIMEOUT;

    while std::time::Instant::now() < deadline {
        if let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(100)) {
            use gstreamer::MessageView;
            match msg.view() {
                MessageView::Error(err) => {
                    return Err(MediaError::PrepareFailed(err.error().to_string()));
                }
                MessageView::AsyncDone(_) => return Ok(()),
                _ => {}
            }
        }
    }
    Err(MediaError::PrepareFailed("preroll timed out".into()))
}

/// Copy an RGBA sample into a tightly packed frame
fn sample_to_frame(sample: &gstreamer::Sample, sequence: u64) -> Option<VideoFrame> {
    let caps = sample.caps()?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    let (width, height) = (info.width(), info.height());
    let stride = *info.stride().first()? as usize;
    let row_bytes = width as usize * 4;

    let data = if stride == row_bytes {
        map.as_slice().get(..row_bytes * height as usize)?.to_vec()
    } else {
        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in map.as_slice().chunks(stride).take(height as usize) {
            packed.extend_from_slice(row.get(..row_bytes)?);
        }
        packed
    };

    let frame = VideoFrame::from_rgba(width, height, data, sequence)?;
    Some(match buffer.pts() {
        Some(pts) => frame.with_pts(Duration::from_nanos(pts.nseconds())),
        None => frame,
    })
}

fn spawn_pump(
    tag: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    output: Arc<dyn FrameSink>,
    looping: Arc<AtomicBool>,
) -> Result<Pump, MediaError> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let timeout = gstreamer::ClockTime::from_mseconds(SAMPLE_TIMEOUT.as_millis() as u64);

    let handle = std::thread::Builder::new()
        .name(format!("camswap-pump-{}", tag))
        .spawn(move || {
            let mut sequence = 0u64;
            while !stop_flag.load(Ordering::SeqCst) {
                if let Some(sample) = appsink.try_pull_sample(timeout) {
                    if let Some(frame) = sample_to_frame(&sample, sequence) {
                        sequence += 1;
                        let total = FRAME_COUNT.fetch_add(1, Ordering::Relaxed);
                        if total % 100 == 0 {
                            debug!(tag = %tag, total, width = frame.width, height = frame.height, "Decoded frame");
                        }
                        output.deliver(frame);
                    }
                    continue;
                }
                if !appsink.is_eos() {
                    continue;
                }
                if !looping.load(Ordering::SeqCst) {
                    debug!(tag = %tag, "End of stream");
                    break;
                }
                if let Err(e) = pipeline.seek_simple(
                    gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::KEY_UNIT,
                    gstreamer::ClockTime::ZERO,
                ) {
                    warn!(tag = %tag, ?e, "Loop seek failed");
                    break;
                }
            }
        })
        .map_err(|e| MediaError::Pipeline(format!("failed to spawn pump: {}", e)))?;

    Ok(Pump { stop, handle })
}

impl MediaPlayer for GstMediaPlayer {
    fn set_source(&mut self, source: MediaSource) -> Result<(), MediaError> {
        if self.pipeline.is_some() {
            return Err(MediaError::InvalidState("source already prepared"));
        }
        self.source = Some(match source {
            MediaSource::Fd(fd) => SourceHandle::Fd(fd),
            MediaSource::Path(path) => {
                if !path.is_file() {
                    return Err(MediaError::OpenFailed(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
                SourceHandle::Path(path)
            }
        });
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), MediaError> {
        let source = self
            .source
            .as_ref()
            .ok_or(MediaError::InvalidState("no source"))?;
        let (pipeline, appsink) = self.build_video_pipeline(source)?;

        pipeline.set_state(gstreamer::State::Paused)?;
        if let Err(e) = wait_for_preroll(&pipeline) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(e);
        }

        info!(tag = %self.tag, "Media prepared");
        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        Ok(())
    }

    fn set_output(&mut self, output: Arc<dyn FrameSink>) {
        self.output = Some(output);
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping.store(looping, Ordering::SeqCst);
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.stop_audio();
        }
    }

    fn start(&mut self) -> Result<(), MediaError> {
        let (Some(pipeline), Some(appsink)) = (self.pipeline.clone(), self.appsink.clone()) else {
            return Err(MediaError::InvalidState("not prepared"));
        };
        let output = self
            .output
            .clone()
            .ok_or(MediaError::InvalidState("no output bound"))?;

        pipeline.set_state(gstreamer::State::Playing)?;
        self.pump = Some(spawn_pump(
            self.tag.clone(),
            pipeline,
            appsink,
            output,
            Arc::clone(&self.looping),
        )?);

        if !self.muted {
            self.audio = self.build_audio_pipeline();
            if let Some(audio) = &self.audio
                && let Err(e) = audio.set_state(gstreamer::State::Playing)
            {
                warn!(tag = %self.tag, ?e, "Audio playback unavailable");
                self.stop_audio();
            }
        }

        self.playing = true;
        info!(tag = %self.tag, muted = self.muted, "Playback started");
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_pump();
        self.stop_audio();
        if let Some(pipeline) = &self.pipeline {
            let _ = pipeline.set_state(gstreamer::State::Paused);
        }
        self.playing = false;
    }

    fn reset(&mut self) {
        self.stop();
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
        self.appsink = None;
        self.output = None;
        self.source = None;
    }

    fn release(&mut self) {
        self.reset();
        debug!(tag = %self.tag, "Player released");
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position(&self) -> Option<Duration> {
        self.pipeline
            .as_ref()?
            .query_position::<gstreamer::ClockTime>()
            .map(|pos| Duration::from_nanos(pos.nseconds()))
    }
}

impl Drop for GstMediaPlayer {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Factory producing [`GstMediaPlayer`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstPlayerFactory;

impl PlayerFactory for GstPlayerFactory {
    fn create(&self, tag: &str) -> Box<dyn MediaPlayer> {
        Box::new(GstMediaPlayer::new(tag))
    }
}
