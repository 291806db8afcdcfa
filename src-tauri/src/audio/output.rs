use super::{AudioBuffer, AudioError};
use crate::audio::pcm::SPEECH_SAMPLE_RATE;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type OnEnded = Box<dyn FnOnce() + Send>;

enum Command {
    Play { buffer: AudioBuffer, on_ended: OnEnded },
    Stop,
    Shutdown,
}

struct Worker {
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

/// The session's one audio output.
///
/// Created once at startup and shared as managed state. The output device is
/// opened lazily on the first playback request and kept for the rest of the
/// session; `shutdown` releases it. cpal streams are not `Send`, so a dedicated
/// thread owns the device and the current stream.
///
/// Every `begin_request` or `stop` starts a new generation. Audio prepared for
/// an older generation is discarded by `play_for`.
pub struct AudioOutput {
    worker: Mutex<Option<Worker>>,
    playing: Arc<AtomicBool>,
    generation: AtomicU64,
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, guard: &mut Option<Worker>) -> Result<mpsc::Sender<Command>, AudioError> {
        if let Some(worker) = guard.as_ref() {
            if !worker.handle.is_finished() {
                return Ok(worker.tx.clone());
            }
        }
        let worker = spawn_worker(self.playing.clone())?;
        let tx = worker.tx.clone();
        *guard = Some(worker);
        Ok(tx)
    }

    /// Stops current playback and opens a new generation for the caller to
    /// fill once its audio is ready.
    pub fn begin_request(&self) -> u64 {
        self.advance()
    }

    /// Plays `buffer` if `request` is still the current generation and
    /// reports whether it did. `on_ended` runs once when this buffer
    /// finishes, is stopped, or is replaced by a later call.
    pub fn play_for(
        &self,
        request: u64,
        buffer: AudioBuffer,
        on_ended: impl FnOnce() + Send + 'static,
    ) -> Result<bool, AudioError> {
        let mut guard = self.lock_worker();
        if self.generation.load(Ordering::SeqCst) != request {
            return Ok(false);
        }
        let tx = self.sender(&mut guard)?;
        tx.send(Command::Play {
            buffer,
            on_ended: Box::new(on_ended),
        })
        .map_err(|_| AudioError::Worker("playback thread stopped".into()))?;
        Ok(true)
    }

    pub fn stop(&self) {
        self.advance();
    }

    fn advance(&self) -> u64 {
        let guard = self.lock_worker();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(worker) = guard.as_ref() {
            let _ = worker.tx.send(Command::Stop);
        }
        self.playing.store(false, Ordering::Relaxed);
        generation
    }

    /// Whether no stop or newer request has followed `request`.
    pub fn is_current(&self, request: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == request
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Stops playback and joins the worker thread.
    pub fn shutdown(&self) {
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            let _ = worker.tx.send(Command::Shutdown);
            if worker.handle.join().is_err() {
                log::error!("Audio worker panicked during shutdown");
            }
        }
        self.playing.store(false, Ordering::Relaxed);
    }
}

fn spawn_worker(playing: Arc<AtomicBool>) -> Result<Worker, AudioError> {
    let (tx, rx) = mpsc::channel::<Command>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

    let handle = std::thread::Builder::new()
        .name("audio-output".into())
        .spawn(move || {
            let opened = open_device();
            let (device, config) = match opened {
                Ok(pair) => {
                    let _ = ready_tx.send(Ok(()));
                    pair
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            log::info!(
                "Audio output ready: {} channel(s) at {} Hz",
                config.channels,
                config.sample_rate.0
            );
            run_worker(&device, &config, &rx, &playing);
        })
        .map_err(|e| AudioError::Worker(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(Worker { tx, handle }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(AudioError::Worker("audio thread exited during startup".into())),
    }
}

fn open_device() -> Result<(cpal::Device, cpal::StreamConfig), AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let config = choose_config(&device)?;
    Ok((device, config))
}

/// Prefers an f32 configuration at the speech sample rate; otherwise the
/// device default, with the cursor stepping the source to match.
fn choose_config(device: &cpal::Device) -> Result<cpal::StreamConfig, AudioError> {
    let target = cpal::SampleRate(SPEECH_SAMPLE_RATE);
    if let Ok(mut ranges) = device.supported_output_configs() {
        if let Some(range) = ranges.find(|r| {
            r.sample_format() == cpal::SampleFormat::F32
                && r.min_sample_rate() <= target
                && target <= r.max_sample_rate()
        }) {
            return Ok(range.with_sample_rate(target).config());
        }
    }
    let default = device
        .default_output_config()
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    Ok(default.config())
}

struct Playback {
    _stream: cpal::Stream,
    finished: Arc<AtomicBool>,
    on_ended: OnEnded,
}

impl Playback {
    fn finish(self) {
        drop(self._stream);
        (self.on_ended)();
    }
}

fn run_worker(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: &mpsc::Receiver<Command>,
    playing: &AtomicBool,
) {
    let mut current: Option<Playback> = None;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Play { buffer, on_ended }) => {
                if let Some(previous) = current.take() {
                    previous.finish();
                }
                let duration = buffer.duration();
                match start_stream(device, config, buffer) {
                    Ok((stream, finished)) => {
                        log::info!("Playing {:.1}s of speech", duration.as_secs_f32());
                        playing.store(true, Ordering::Relaxed);
                        current = Some(Playback {
                            _stream: stream,
                            finished,
                            on_ended,
                        });
                    }
                    Err(e) => {
                        log::error!("Failed to start playback: {}", e);
                        playing.store(false, Ordering::Relaxed);
                        on_ended();
                    }
                }
            }
            Ok(Command::Stop) => {
                if let Some(previous) = current.take() {
                    previous.finish();
                }
                playing.store(false, Ordering::Relaxed);
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(previous) = current.take() {
                    previous.finish();
                }
                playing.store(false, Ordering::Relaxed);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let done = current
                    .as_ref()
                    .is_some_and(|p| p.finished.load(Ordering::Relaxed));
                if done {
                    if let Some(previous) = current.take() {
                        previous.finish();
                    }
                    playing.store(false, Ordering::Relaxed);
                }
            }
        }
    }
}

fn start_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: AudioBuffer,
) -> Result<(cpal::Stream, Arc<AtomicBool>), AudioError> {
    let channels = config.channels as usize;
    let mut cursor = PlaybackCursor::new(buffer, config.sample_rate.0);
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cursor.fill(data, channels) {
                    flag.store(true, Ordering::Relaxed);
                }
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    Ok((stream, finished))
}

/// Feeds a mono buffer into interleaved device frames, stepping through the
/// source at `source_rate / device_rate` per frame (sample-and-hold).
pub struct PlaybackCursor {
    samples: Vec<f32>,
    position: f64,
    step: f64,
}

impl PlaybackCursor {
    pub fn new(buffer: AudioBuffer, device_rate: u32) -> Self {
        let step = buffer.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            samples: buffer.samples,
            position: 0.0,
            step,
        }
    }

    /// Fills `out` and reports whether the source is exhausted. Frames past
    /// the end are silence.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) -> bool {
        for frame in out.chunks_mut(channels.max(1)) {
            let index = self.position as usize;
            match self.samples.get(index) {
                Some(&value) => {
                    frame.fill(value);
                    self.position += self.step;
                }
                None => frame.fill(0.0),
            }
        }
        self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.position as usize >= self.samples.len()
    }
}
