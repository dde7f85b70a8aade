//! `avpipe-play`: headless player.
//!
//! Plays a media file (or a synthetic test pattern) through the pipeline,
//! hands frames to a channel display drained by the main thread and logs
//! status once per second until playback ends.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};

use avpipe::audio::{AudioSink, ClockedSink};
use avpipe::core::PlayerConfig;
use avpipe::decode::{MediaSource, SyntheticSource};
use avpipe::playback::{ChannelDisplay, PlaybackController, PlaybackState};

const SYNTHETIC_FPS: f64 = 30.0;
const SYNTHETIC_SAMPLE_RATE: u32 = 48_000;
const DISPLAY_QUEUE: usize = 4;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("avpipe-play")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("input")
                .value_name("PATH")
                .help("Media file to play")
                .value_parser(clap::value_parser!(PathBuf))
                .required_unless_present("synthetic"),
        )
        .arg(
            Arg::new("loop")
                .long("loop")
                .help("Restart from the beginning at end of stream")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("volume")
                .long("volume")
                .value_name("0.0-1.0")
                .help("Initial volume")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML player configuration")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("synthetic")
                .long("synthetic")
                .value_name("SECONDS")
                .help("Play a generated test pattern of this length instead of a file")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .help("Do not decode or play audio")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PlayerConfig::load_from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if matches.get_flag("loop") {
        config.loop_playback = true;
    }
    if let Some(volume) = matches.get_one::<f32>("volume") {
        config.volume = *volume;
    }
    config.validate()?;

    let no_audio = matches.get_flag("no-audio");
    let source: Box<dyn MediaSource> = match matches.get_one::<f64>("synthetic") {
        Some(&seconds) => {
            let source = SyntheticSource::new(seconds, SYNTHETIC_FPS);
            if no_audio {
                Box::new(source)
            } else {
                Box::new(source.with_audio(SYNTHETIC_SAMPLE_RATE, 2))
            }
        }
        None => match matches.get_one::<PathBuf>("input") {
            Some(path) => open_file(path, &config)?,
            None => bail!("no input given"),
        },
    };

    let sink = match source.info().audio {
        Some(audio) if !no_audio => Some(open_sink(audio.sample_rate, audio.channels)),
        _ => None,
    };

    let (display, frames) = ChannelDisplay::bounded(DISPLAY_QUEUE);
    let controller = PlaybackController::start(source, sink, Box::new(display), config)?;
    log::info!("Decoding with {}", controller.backend());

    let mut received = 0u64;
    let mut last_report = Instant::now();
    loop {
        if frames.recv_timeout(Duration::from_millis(50)).is_ok() {
            received += 1;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            log::info!("{} | {} | {} frames received", controller.status(), controller.info(), received);
            last_report = Instant::now();
        }
        if controller.state() == PlaybackState::Ended {
            break;
        }
    }

    let stats = controller.stats();
    log::info!(
        "Finished: {} frames displayed, {} dropped",
        stats.frames_displayed,
        stats.frames_dropped
    );
    controller.stop();
    Ok(())
}

#[cfg(feature = "ffmpeg")]
fn open_file(path: &std::path::Path, config: &PlayerConfig) -> anyhow::Result<Box<dyn MediaSource>> {
    let source = avpipe::decode::FfmpegSource::open(path, config)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_file(path: &std::path::Path, _config: &PlayerConfig) -> anyhow::Result<Box<dyn MediaSource>> {
    bail!(
        "cannot open {}: built without the `ffmpeg` feature (try --synthetic)",
        path.display()
    )
}

#[cfg(feature = "cpal")]
fn open_sink(sample_rate: u32, channels: u16) -> Box<dyn AudioSink> {
    match avpipe::audio::CpalSink::open(sample_rate, channels) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            log::warn!("Audio device unavailable ({}), using a silent clocked sink", e);
            Box::new(ClockedSink::new())
        }
    }
}

#[cfg(not(feature = "cpal"))]
fn open_sink(_sample_rate: u32, _channels: u16) -> Box<dyn AudioSink> {
    Box::new(ClockedSink::new())
}
