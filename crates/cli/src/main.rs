use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use facewatch_core::capture::infrastructure::ffmpeg_capture::FfmpegCaptureProvider;
use facewatch_core::detection::domain::model_source::ModelSource;
use facewatch_core::detection::infrastructure::library_resolver::LibraryResolver;
use facewatch_core::watcher::config::WatcherConfig;
use facewatch_core::watcher::face_watcher::FaceWatcher;

/// Watch a video source for face presence.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// Video file or camera device node to watch (e.g. clip.mp4, /dev/video0).
    input: PathBuf,

    /// Delay between detection ticks, in milliseconds.
    #[arg(long, default_value = "100")]
    interval: u64,

    /// Stop after this many seconds (0 = run until interrupted).
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Explicit model source: a local .onnx path or an http(s) URL.
    #[arg(long)]
    model: Option<String>,

    /// Directory holding the ONNX Runtime libraries, checked before any
    /// download.
    #[arg(long)]
    lib_dir: Option<PathBuf>,

    /// Allow downloading missing dependencies from their release URLs.
    #[arg(long)]
    allow_downloads: bool,

    /// Run one detection probe, print the result, and exit.
    #[arg(long)]
    probe: bool,

    /// Log every detection tick.
    #[arg(long)]
    debug: bool,
}

enum WatchEvent {
    Face,
    NoFace,
    Error(String),
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.lib_dir {
        LibraryResolver::process_wide().set_default_dir(dir);
    }

    let config = WatcherConfig {
        interval: Duration::from_millis(cli.interval),
        debug: cli.debug,
        model_source: cli.model.as_deref().map(parse_model_source),
        offline_only: !cli.allow_downloads,
        ..WatcherConfig::default()
    };

    let mut watcher = FaceWatcher::new(config, Box::new(FfmpegCaptureProvider::new(&cli.input)));

    // Bridge loop-thread callbacks onto this thread for printing.
    let (tx, rx) = crossbeam_channel::unbounded::<WatchEvent>();
    let sender = tx.clone();
    watcher.on_face_detected(move || {
        let _ = sender.send(WatchEvent::Face);
    });
    let sender = tx.clone();
    watcher.on_no_face(move || {
        let _ = sender.send(WatchEvent::NoFace);
    });
    watcher.on_error(move |e| {
        let _ = tx.send(WatchEvent::Error(e.to_string()));
    });

    watcher.initialize()?;

    if cli.probe {
        let present = watcher.detect_face()?;
        println!("{}", if present { "face detected" } else { "no face" });
        watcher.destroy();
        return Ok(());
    }

    watcher.start_detection()?;
    log::info!("watching {} (Ctrl-C to abort)", cli.input.display());

    let deadline = (cli.duration > 0).then(|| Instant::now() + Duration::from_secs(cli.duration));
    let mut last_presence: Option<bool> = None;

    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                remaining
            }
            None => Duration::from_secs(1),
        };

        match rx.recv_timeout(timeout) {
            Ok(WatchEvent::Face) => {
                if last_presence != Some(true) {
                    println!("face detected");
                    last_presence = Some(true);
                }
            }
            Ok(WatchEvent::NoFace) => {
                if last_presence != Some(false) {
                    println!("no face");
                    last_presence = Some(false);
                }
            }
            Ok(WatchEvent::Error(message)) => log::warn!("detection error: {message}"),
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.destroy();
    Ok(())
}

fn parse_model_source(value: &str) -> ModelSource {
    if value.starts_with("http://") || value.starts_with("https://") {
        ModelSource::Url(value.to_string())
    } else {
        ModelSource::Path(PathBuf::from(value))
    }
}
