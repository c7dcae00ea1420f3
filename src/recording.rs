//! Microphone capture for voice messages.
//!
//! A [`CaptureDevice`] produces a [`CaptureStream`] of raw chunks. The
//! [`Recorder`] drives the idle → recording → encoding → idle cycle and turns
//! the buffered chunks into a [`Recording`] with a best-effort duration.

use crate::config::Settings;
use crate::error::{Error, Result};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

/// Assumed byte rate when the captured audio cannot be decoded.
pub const FALLBACK_BYTES_PER_SEC: f64 = 4000.0;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub duration_secs: f64,
    /// The duration came from the byte-rate fallback rather than a decode.
    pub estimated: bool,
}

impl Recording {
    pub fn file_name(&self) -> &'static str {
        match self.mime.as_str() {
            "audio/wav" | "audio/x-wav" => "recording.wav",
            "audio/ogg" => "recording.ogg",
            _ => "recording.mp3",
        }
    }

    pub fn display_duration(&self) -> String {
        crate::format::format_duration(self.duration_secs)
    }
}

/// Receiving end of a capture: chunks in arrival order plus a way to stop the
/// underlying tracks.
#[derive(Debug)]
pub struct CaptureStream {
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    stop: Option<oneshot::Sender<()>>,
    mime: String,
}

/// Producing end handed to device implementations.
#[derive(Debug)]
pub struct CaptureSink {
    pub chunks: mpsc::UnboundedSender<Vec<u8>>,
    pub stop: oneshot::Receiver<()>,
}

impl CaptureStream {
    pub fn channel(mime: &str) -> (CaptureStream, CaptureSink) {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        (
            CaptureStream {
                chunks: chunk_rx,
                stop: Some(stop_tx),
                mime: mime.to_string(),
            },
            CaptureSink {
                chunks: chunk_tx,
                stop: stop_rx,
            },
        )
    }

    fn stop_tracks(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The producer may already be gone.
            let _ = stop.send(());
        }
    }

    /// Stops the capture and collects everything it produced.
    async fn drain(mut self) -> Vec<u8> {
        self.stop_tracks();
        let mut bytes = Vec::new();
        while let Some(chunk) = self.chunks.recv().await {
            bytes.extend_from_slice(&chunk);
        }
        bytes
    }
}

pub trait CaptureDevice {
    /// Starts capturing. Fails with `Error::Permission` when the microphone
    /// cannot be opened.
    fn open(&self) -> Result<CaptureStream>;
}

/// Captures by running an external recorder that writes audio to stdout.
///
/// `open` spawns onto the current tokio runtime, so it must be called from
/// within one.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    mime: String,
}

impl CommandCapture {
    pub fn new(command: &[String], mime: &str) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("recorder_command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            mime: mime.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.recorder_command, "audio/wav")
    }
}

impl CaptureDevice for CommandCapture {
    fn open(&self) -> Result<CaptureStream> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Permission(format!("{}: {e}", self.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Permission(format!("{}: no audio output", self.program)))?;

        let (stream, sink) = CaptureStream::channel(&self.mime);
        tokio::spawn(pump(child, stdout, sink));
        Ok(stream)
    }
}

async fn pump(
    mut child: tokio::process::Child,
    mut stdout: tokio::process::ChildStdout,
    sink: CaptureSink,
) {
    let CaptureSink { chunks, mut stop } = sink;
    let mut buf = vec![0u8; READ_CHUNK];
    let mut stopping = false;
    loop {
        tokio::select! {
            _ = &mut stop, if !stopping => {
                // Keep reading after the kill so nothing already in the pipe is lost.
                stopping = true;
                if let Err(e) = child.start_kill() {
                    log::debug!("Recorder already exited: {e}");
                }
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if chunks.send(buf[..n].to_vec()).is_err() {
                        // Cancelled: nobody wants the audio anymore.
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Recorder read failed: {e}");
                    break;
                }
            }
        }
    }
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        log::debug!("Waiting for recorder failed: {e}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Encoding,
}

pub struct Recorder<D> {
    device: D,
    state: RecorderState,
    stream: Option<CaptureStream>,
    started: Option<Instant>,
}

impl<D: CaptureDevice> Recorder<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: RecorderState::Idle,
            stream: None,
            started: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Opens the microphone. On failure the error is logged and the recorder
    /// stays idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RecorderState::Idle {
            log::debug!("Ignoring start while {:?}", self.state);
            return Ok(());
        }
        match self.device.open() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.started = Some(Instant::now());
                self.state = RecorderState::Recording;
                log::info!("Recording started");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start recording: {e}");
                Err(e)
            }
        }
    }

    /// Ends capture and moves to encoding. Await the returned finalizer for
    /// the audio, then call [`Recorder::finish_encoding`].
    pub fn stop(&mut self) -> Option<Finalizer> {
        if self.state != RecorderState::Recording {
            return None;
        }
        let stream = self.stream.take()?;
        self.state = RecorderState::Encoding;
        self.started = None;
        Some(Finalizer { stream })
    }

    /// Stops the capture and throws away everything buffered so far.
    pub fn cancel(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            log::info!("Recording cancelled");
        }
        self.started = None;
        self.state = RecorderState::Idle;
    }

    pub fn finish_encoding(&mut self) {
        if self.state == RecorderState::Encoding {
            self.state = RecorderState::Idle;
        }
    }
}

#[derive(Debug)]
pub struct Finalizer {
    stream: CaptureStream,
}

impl Finalizer {
    pub async fn finish(self) -> Recording {
        let mime = self.stream.mime.clone();
        let bytes = self.stream.drain().await;
        let (duration_secs, estimated) = estimate_duration(&bytes);
        log::info!(
            "Recorded {} bytes, {duration_secs:.2}s{}",
            bytes.len(),
            if estimated { " (estimated)" } else { "" }
        );
        Recording {
            bytes,
            mime,
            duration_secs,
            estimated,
        }
    }
}

/// Duration in seconds, and whether it had to be estimated from the size.
pub fn estimate_duration(bytes: &[u8]) -> (f64, bool) {
    match decode_wav_duration(bytes) {
        Ok(secs) if secs.is_finite() && secs > 0.0 => (secs, false),
        Ok(secs) => {
            log::warn!("Decoded unusable duration {secs}, estimating");
            (fallback_duration(bytes.len()), true)
        }
        Err(e) => {
            log::warn!("Error decoding audio: {e}");
            (fallback_duration(bytes.len()), true)
        }
    }
}

pub fn fallback_duration(total_bytes: usize) -> f64 {
    total_bytes as f64 / FALLBACK_BYTES_PER_SEC
}

fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Reads the playing time out of a RIFF/WAVE header. A data chunk that
/// claims more bytes than present (streamed WAV) is measured by what is there.
pub fn decode_wav_duration(bytes: &[u8]) -> Result<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(Error::Decode("not a WAV stream".into()));
    }
    let mut offset = 12;
    let mut byte_rate = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = le_u32(bytes, offset + 4).unwrap_or(0) as usize;
        let body = offset + 8;
        match id {
            b"fmt " => {
                if size < 16 {
                    return Err(Error::Decode("short fmt chunk".into()));
                }
                byte_rate = Some(
                    le_u32(bytes, body + 8)
                        .ok_or_else(|| Error::Decode("truncated fmt chunk".into()))?,
                );
            }
            b"data" => {
                let rate = byte_rate.ok_or_else(|| Error::Decode("data before fmt".into()))?;
                let available = bytes.len() - body;
                let len = size.min(available);
                return Ok(len as f64 / rate as f64);
            }
            _ => {}
        }
        offset = body.saturating_add(size).saturating_add(size & 1);
    }
    Err(Error::Decode("no data chunk".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(byte_rate: u32, data_len: u32, actual: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&36u32.wrapping_add(data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&(byte_rate / 2).to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend(std::iter::repeat(0u8).take(actual));
        out
    }

    struct ScriptedDevice {
        chunks: Vec<Vec<u8>>,
        deny: bool,
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&self) -> Result<CaptureStream> {
            if self.deny {
                return Err(Error::Permission("denied".into()));
            }
            let (stream, sink) = CaptureStream::channel("audio/wav");
            for chunk in &self.chunks {
                sink.chunks.send(chunk.clone()).unwrap();
            }
            Ok(stream)
        }
    }

    #[test]
    fn decodes_wav_header() {
        let bytes = wav(32_000, 64_000, 64_000);
        assert_eq!(decode_wav_duration(&bytes).unwrap(), 2.0);
        assert_eq!(estimate_duration(&bytes), (2.0, false));
    }

    #[test]
    fn streamed_wav_uses_bytes_present() {
        let bytes = wav(32_000, u32::MAX - 100, 16_000);
        assert_eq!(decode_wav_duration(&bytes).unwrap(), 0.5);
    }

    #[test]
    fn zero_byte_rate_falls_back() {
        let bytes = wav(0, 8_000, 8_000);
        let (secs, estimated) = estimate_duration(&bytes);
        assert!(estimated);
        assert_eq!(secs, bytes.len() as f64 / FALLBACK_BYTES_PER_SEC);
    }

    #[test]
    fn undecodable_audio_falls_back_to_byte_rate() {
        let bytes = vec![0xAB; 10_000];
        assert!(matches!(decode_wav_duration(&bytes), Err(Error::Decode(_))));
        let (secs, estimated) = estimate_duration(&bytes);
        assert!(estimated);
        assert_eq!(secs, 2.5);
        assert_eq!(crate::format::format_duration(secs), "0:02");
    }

    #[tokio::test]
    async fn stop_collects_chunks_in_order() {
        let mut recorder = Recorder::new(ScriptedDevice {
            chunks: vec![vec![1; 6000], vec![2; 6000]],
            deny: false,
        });
        recorder.start().unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);

        let finalizer = recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Encoding);
        assert!(recorder.stop().is_none());

        let recording = finalizer.finish().await;
        recorder.finish_encoding();
        assert_eq!(recorder.state(), RecorderState::Idle);

        assert_eq!(recording.bytes.len(), 12_000);
        assert_eq!(recording.bytes[0], 1);
        assert_eq!(recording.bytes[11_999], 2);
        assert!(recording.estimated);
        assert_eq!(recording.duration_secs, 3.0);
        assert_eq!(recording.display_duration(), "0:03");
        assert_eq!(recording.file_name(), "recording.wav");
    }

    #[test]
    fn cancel_discards_capture() {
        let mut recorder = Recorder::new(ScriptedDevice {
            chunks: vec![vec![1; 100]],
            deny: false,
        });
        recorder.start().unwrap();
        recorder.cancel();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.stop().is_none());
        assert_eq!(recorder.elapsed_secs(), 0);
    }

    #[test]
    fn denied_microphone_stays_idle() {
        let mut recorder = Recorder::new(ScriptedDevice {
            chunks: Vec::new(),
            deny: true,
        });
        assert!(matches!(recorder.start(), Err(Error::Permission(_))));
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.stop().is_none());
    }

    #[tokio::test]
    async fn missing_recorder_program_is_a_permission_error() {
        let command = vec!["jobchat-no-such-recorder".to_string()];
        let device = CommandCapture::new(&command, "audio/wav").unwrap();
        let mut recorder = Recorder::new(device);
        assert!(matches!(recorder.start(), Err(Error::Permission(_))));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn empty_recorder_command_is_rejected() {
        assert!(matches!(CommandCapture::new(&[], "audio/wav"), Err(Error::Config(_))));
    }
}
