//! cpal audio output.
//!
//! `cpal::Stream` must stay on the thread that built it, so the stream lives
//! on a dedicated output thread and the sink talks to it through a shared
//! sample queue plus a command channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use crossbeam::channel;

use crate::audio::buffer::AudioBuffer;
use crate::audio::sink::{AudioSink, AudioSinkError};
use crate::core::lock;
use crate::core::time::Seconds;

enum OutputCommand {
    Pause,
    Resume,
    Shutdown,
}

/// Default output device fed from an interleaved f32 queue
pub struct CpalSink {
    samples: Arc<Mutex<VecDeque<f32>>>,
    paused: Arc<AtomicBool>,
    commands: channel::Sender<OutputCommand>,
    thread: Option<thread::JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl CpalSink {
    /// Open the default output device for the given stream format
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self, AudioSinkError> {
        let samples = Arc::new(Mutex::new(VecDeque::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded(1);

        let callback_samples = Arc::clone(&samples);
        let callback_paused = Arc::clone(&paused);
        let handle = thread::Builder::new()
            .name("avpipe-audio-out".to_string())
            .spawn(move || {
                let stream = match build_stream(sample_rate, channels, callback_samples, callback_paused) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_output(stream, command_rx);
            })
            .map_err(|e| AudioSinkError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioSinkError::Thread("output thread exited during setup".to_string()));
            }
        }

        log::info!("Audio output opened: {} Hz, {} channels", sample_rate, channels);
        Ok(Self {
            samples,
            paused,
            commands: command_tx,
            thread: Some(handle),
            sample_rate,
            channels,
        })
    }

    fn send(&self, command: OutputCommand) -> Result<(), AudioSinkError> {
        self.commands
            .send(command)
            .map_err(|_| AudioSinkError::Thread("audio output thread has exited".to_string()))
    }
}

fn build_stream(
    sample_rate: u32,
    channels: u16,
    samples: Arc<Mutex<VecDeque<f32>>>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioSinkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioSinkError::NoDevice)?;
    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if paused.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }
                let mut queue = lock(&samples);
                for sample in data.iter_mut() {
                    // underrun plays silence
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::StreamConfigNotSupported => AudioSinkError::UnsupportedFormat {
                sample_rate,
                channels,
            },
            other => AudioSinkError::Stream(other.to_string()),
        })?;

    stream.play().map_err(|e| AudioSinkError::Stream(e.to_string()))?;
    Ok(stream)
}

/// Keep the stream alive and apply pause/resume until shutdown
fn run_output(stream: cpal::Stream, commands: channel::Receiver<OutputCommand>) {
    while let Ok(command) = commands.recv() {
        let result = match command {
            OutputCommand::Pause => stream.pause().map_err(|e| e.to_string()),
            OutputCommand::Resume => stream.play().map_err(|e| e.to_string()),
            OutputCommand::Shutdown => break,
        };
        if let Err(e) = result {
            log::warn!("Audio stream control failed: {}", e);
        }
    }
    log::debug!("Audio output thread exiting");
}

impl AudioSink for CpalSink {
    fn queue(&mut self, buffer: &AudioBuffer) -> Result<(), AudioSinkError> {
        if buffer.sample_rate != self.sample_rate || buffer.channels != self.channels {
            return Err(AudioSinkError::UnsupportedFormat {
                sample_rate: buffer.sample_rate,
                channels: buffer.channels,
            });
        }
        lock(&self.samples).extend(buffer.as_slice().iter().copied());
        Ok(())
    }

    fn queued_duration(&self) -> Seconds {
        let queued = lock(&self.samples).len();
        queued as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }

    fn clear(&mut self) {
        lock(&self.samples).clear();
    }

    fn pause(&mut self) -> Result<(), AudioSinkError> {
        self.paused.store(true, Ordering::Relaxed);
        self.send(OutputCommand::Pause)
    }

    fn resume(&mut self) -> Result<(), AudioSinkError> {
        self.paused.store(false, Ordering::Relaxed);
        self.send(OutputCommand::Resume)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.commands.send(OutputCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Audio output thread panicked");
            }
        }
    }
}
