mod capture;
mod output;

use anyhow::{Context, Result};
use backdrop::background::{BackgroundRequest, BackgroundStore, ChangeOutcome};
use backdrop::segmentation::{self, MaskProvider, NoSegmentation};
use backdrop::{Compositor, FrameProcessor, ScaleFilter};
use capture::{CaptureSource, WebcamCapture};
use clap::Parser;
use output::{OutputSink, V4L2Output};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1920)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 1080)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Square input edge the model segments at
    #[arg(long, default_value_t = 512)]
    model_size: u32,

    /// Replacement background: file path, file:// or http(s):// URI.
    /// More locators can be typed on stdin, one per line, while running
    #[arg(short, long)]
    background: Option<String>,

    /// Resampling used to stretch mask and background to the frame
    #[arg(long, value_enum, default_value_t = ScaleFilter::Bilinear)]
    scale_filter: ScaleFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
    )
    .context("Failed to initialize webcam capture")?;

    let mut output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let provider: Box<dyn MaskProvider> = if let Some(model_path) = &args.model {
        let model = segmentation::create_default_model(model_path, args.model_size)
            .context("Failed to load segmentation model")?;
        if let Some((width, height)) = model.input_size() {
            tracing::info!("Segmenting at {}x{}", width, height);
        }
        model
    } else {
        tracing::info!("Running in passthrough mode (no segmentation)");
        Box::new(NoSegmentation)
    };

    let store = Arc::new(BackgroundStore::default());
    if let Some(source) = &args.background {
        request_background(&store, source);
    } else {
        tracing::info!("No background yet, frames pass through until one is loaded");
    }
    spawn_stdin_listener(Arc::clone(&store))?;

    let processor = FrameProcessor::new(provider, store, Compositor::new(args.scale_filter));

    run_pipeline(&mut capture, &mut output, processor, args.fps)
}

/// Start a background change and report its outcome when it finishes
fn request_background(store: &Arc<BackgroundStore>, source: &str) {
    match store.request_background_change(source) {
        Ok(request) => watch_request(request),
        Err(e) => tracing::error!("Could not start background change: {}", e),
    }
}

fn watch_request(request: BackgroundRequest) {
    let id = request.id();
    let spawned = thread::Builder::new()
        .name(format!("backdrop-watch-{}", id))
        .spawn(move || match request.wait() {
            Ok(ChangeOutcome::Installed) => tracing::info!("Background #{} is live", id),
            Ok(ChangeOutcome::Superseded) => {
                tracing::debug!("Background #{} replaced by a newer request", id)
            }
            Err(e) => tracing::error!("Background #{} failed to load: {}", id, e),
        });
    if let Err(e) = spawned {
        tracing::warn!("Could not watch background change #{}: {}", id, e);
    }
}

/// Read background locators from stdin, one per line
fn spawn_stdin_listener(store: Arc<BackgroundStore>) -> Result<()> {
    thread::Builder::new()
        .name("backdrop-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Stopped reading background requests: {}", e);
                        break;
                    }
                };
                let source = line.trim();
                if !source.is_empty() {
                    request_background(&store, source);
                }
            }
        })
        .context("Failed to start stdin listener")?;
    Ok(())
}

fn run_pipeline<C, O, M>(
    capture: &mut C,
    output: &mut O,
    mut processor: FrameProcessor<M>,
    target_fps: u32,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
    M: MaskProvider,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    let (capture_width, capture_height) = capture.resolution();
    let (output_width, output_height) = output.resolution();
    tracing::info!(
        "Starting main pipeline loop ({}x{} -> {}x{})",
        capture_width,
        capture_height,
        output_width,
        output_height
    );
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        let process_start = Instant::now();
        let outcome = processor.process(&frame);
        total_process_time += process_start.elapsed();

        let output_start = Instant::now();
        // Dropped frames produce no output
        if let Some(processed) = outcome.frame() {
            output
                .write_frame(processed)
                .context("Failed to write frame")?;
        }
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_process_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;
            let stats = processor.stats();

            tracing::info!(
                "Frame {}: capture={:.1}ms, process={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1} \
                 (composited={}, no_mask={}, no_background={}, dropped={})",
                frame_count,
                avg_capture_ms,
                avg_process_ms,
                avg_output_ms,
                total_ms,
                actual_fps,
                stats.composited,
                stats.no_mask,
                stats.no_background,
                stats.dropped
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }
}
