// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Showing settings and the media library
//! - Cycling the selected substitute video
//! - Producing a replacement photo
//! - Running a simulated camera session

use camswap::backends::capture::{
    CaptureSession, HeadlessSurface, RequestBuilder, RequestTemplate, SessionArgs,
    SessionCallback, SessionShape, TargetSurface,
};
use camswap::backends::compositor::default_backend;
use camswap::media::{GstPlayerFactory, GstSnapshotter, MediaLibrary, MediaSourceProvider};
use camswap::notify::LogPresenter;
use camswap::pipelines::photo::PhotoRequest;
use camswap::pipelines::photo::encoding::{save_jpeg, save_jpeg_to};
use camswap::{
    CaptureInterceptor, Collaborators, ConfigManager, ConfigProvider, SessionContext,
    SimulatedPlatform,
};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_SAVE_FOLDER: &str = "camswap";

/// Platform level of the simulated camera; every session shape is available
const SIMULATED_PLATFORM_LEVEL: u32 = 34;

fn open_library() -> Result<(Arc<ConfigManager>, Arc<MediaLibrary>), Box<dyn std::error::Error>> {
    let config = Arc::new(ConfigManager::open_default()?);
    let library = MediaLibrary::from_config(Arc::clone(&config)).ok_or("No media directory")?;
    Ok((config, Arc::new(library)))
}

fn context(
    config: &Arc<ConfigManager>,
    library: &Arc<MediaLibrary>,
    gpu: bool,
) -> Result<Arc<SessionContext>, Box<dyn std::error::Error>> {
    Ok(SessionContext::new(Collaborators {
        config: config.clone(),
        media: library.clone(),
        presenter: Arc::new(LogPresenter),
        graphics: default_backend(gpu),
        players: Arc::new(GstPlayerFactory),
        snapshotter: Arc::new(GstSnapshotter),
    })?)
}

/// Print settings and available videos
pub fn show_info() -> Result<(), Box<dyn std::error::Error>> {
    let (config, library) = open_library()?;

    match config.path() {
        Some(path) => println!("Settings: {}", path.display()),
        None => println!("Settings: in memory"),
    }
    println!("{}", serde_json::to_string_pretty(&config.current())?);
    println!();

    println!("Media directory: {}", library.dir().display());
    let current = library.current_path();
    let videos = library.videos();
    if videos.is_empty() {
        println!("  No videos found.");
    }
    for video in videos {
        let marker = if current.as_ref() == Some(&video) { "*" } else { " " };
        let name = video.file_name().map(|n| n.to_string_lossy().into_owned());
        println!("  {} {}", marker, name.unwrap_or_default());
    }
    Ok(())
}

/// Move the selection one video forward or back
pub fn switch_video(forward: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (_, library) = open_library()?;
    let changed = if forward {
        library.switch_to_next()
    } else {
        library.switch_to_previous()
    };

    match library.current_path() {
        Some(path) if changed => println!("Selected: {}", path.display()),
        Some(path) => println!("Unchanged: {}", path.display()),
        None => return Err("No videos in the media directory".into()),
    }
    Ok(())
}

/// Run the photo production chain and save the result
pub fn snapshot(
    output: Option<PathBuf>,
    width: u32,
    height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, library) = open_library()?;
    let ctx = context(&config, &library, false)?;

    let encoded = ctx
        .photo()
        .produce(&PhotoRequest::new(width, height), usize::MAX)?;
    println!(
        "Photo: {}x{} ({} bytes, {})",
        encoded.width,
        encoded.height,
        encoded.data.len(),
        encoded.quality.display_name()
    );

    let saved = ctx.tasks().handle().block_on(async {
        match output {
            Some(path) => save_jpeg_to(encoded, path).await,
            None => save_jpeg(encoded, &default_photo_dir()).await,
        }
    })?;
    println!("Photo saved: {}", saved.display());
    Ok(())
}

pub struct SimulateOptions {
    pub width: u32,
    pub height: u32,
    pub seconds: u64,
    pub rotation: Option<i32>,
    pub gpu: bool,
    pub output: Option<PathBuf>,
}

struct PrintCallback;

impl SessionCallback for PrintCallback {
    fn on_configured(&self, session: &CaptureSession) {
        println!("Session {} configured", session.id);
    }

    fn on_configure_failed(&self, session: &CaptureSession) {
        println!("Session {} failed to configure", session.id);
    }
}

/// Drive a simulated device through open, session, request and close
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (config, library) = open_library()?;
    let video = library
        .current_path()
        .ok_or("No substitute video in the media directory")?;
    println!("Substitute video: {}", video.display());

    let ctx = context(&config, &library, options.gpu)?;
    let platform = Arc::new(SimulatedPlatform::new(SIMULATED_PLATFORM_LEVEL));
    let camera = CaptureInterceptor::new(Arc::clone(&ctx), platform.clone());

    camera.on_device_open("simulated-0");
    let preview = HeadlessSurface::preview("camswap-preview", options.width, options.height);
    let target: Arc<dyn TargetSurface> = preview.clone();
    camera.create_session(
        SessionShape::SurfaceList,
        SessionArgs::surfaces(vec![Arc::clone(&target)], Arc::new(PrintCallback)),
    )?;

    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    camera.add_target(&mut builder, target);
    let request = camera.build(&builder);
    if let Some(degrees) = options.rotation {
        ctx.playback().update_rotation(degrees);
    }
    println!("Playing... (press Ctrl+C to stop early)");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    // Repeating request at roughly 30 fps
    let start = Instant::now();
    let duration = Duration::from_secs(options.seconds);
    while start.elapsed() < duration && !stop_flag.load(Ordering::SeqCst) {
        camera.capture(&request)?;
        print!(
            "\rPresented: {} frames, camera frames discarded: {}",
            preview.frames_presented(),
            ctx.sink().map_or(0, |s| s.frames_discarded())
        );
        std::io::Write::flush(&mut std::io::stdout())?;
        std::thread::sleep(Duration::from_millis(33));
    }
    println!();

    let last = preview.latest_frame();
    camera.on_device_close();

    let frame = last.ok_or("No frame was presented")?;
    let image = frame.to_rgba_image().ok_or("Presented frame is malformed")?;
    let path = match options.output {
        Some(path) => path,
        None => {
            let dir = default_photo_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("simulate_{}.png", timestamp))
        }
    };
    image.save(&path)?;
    println!("Last frame saved: {}", path.display());
    Ok(())
}

fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
