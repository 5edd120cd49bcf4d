//! WAV-backed capture track and clip loading.

use crate::error::Result;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tapedeck_core::{CaptureSpan, CaptureTrack, Clip, DiskThread, Region};
use tracing::debug;

fn storage(e: hound::Error) -> tapedeck_core::Error {
    tapedeck_core::Error::Storage(e.to_string())
}

/// A finalized capture and the file holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavTake {
    pub region: Region,
    pub path: PathBuf,
}

/// Open WAV file of one capture.
pub struct WavCapture {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    channels: usize,
}

/// Capture track writing one 32-bit float WAV file per capture.
///
/// Files are named `<track>-<n>.wav` inside the track's directory.
#[derive(Debug)]
pub struct WavCaptureTrack {
    name: String,
    dir: PathBuf,
    sample_rate: u32,
    /// Latency of the capture path, subtracted from region starts.
    capture_offset: u64,
    captures: usize,
    takes: Vec<WavTake>,
}

impl WavCaptureTrack {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            sample_rate,
            capture_offset: 0,
            captures: 0,
            takes: Vec::new(),
        }
    }

    pub fn with_capture_offset(mut self, frames: u64) -> Self {
        self.capture_offset = frames;
        self
    }

    pub fn set_capture_offset(&mut self, frames: u64) {
        self.capture_offset = frames;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn takes(&self) -> &[WavTake] {
        &self.takes
    }
}

impl CaptureTrack for WavCaptureTrack {
    type Capture = WavCapture;

    fn record(
        &mut self,
        _disk: &DiskThread,
        start: u64,
        channels: usize,
    ) -> tapedeck_core::Result<WavCapture> {
        self.captures += 1;
        let path = self.dir.join(format!("{}-{}.wav", self.name, self.captures));
        let spec = WavSpec {
            channels: channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(&path, spec).map_err(storage)?;
        debug!(path = %path.display(), start, channels, "capture file created");
        Ok(WavCapture {
            writer,
            path,
            channels,
        })
    }

    fn write(
        &mut self,
        _disk: &DiskThread,
        capture: &mut WavCapture,
        buf: &[f32],
        frames: usize,
    ) -> tapedeck_core::Result<usize> {
        for &sample in &buf[..frames * capture.channels] {
            capture.writer.write_sample(sample).map_err(storage)?;
        }
        Ok(frames)
    }

    fn finalize(
        &mut self,
        _disk: &DiskThread,
        capture: WavCapture,
        span: CaptureSpan,
    ) -> tapedeck_core::Result<Region> {
        let WavCapture { writer, path, .. } = capture;
        writer.finalize().map_err(storage)?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        let region = Region {
            name,
            start: span.start.saturating_sub(self.capture_offset),
            length: span.frames,
        };
        self.takes.push(WavTake {
            region: region.clone(),
            path,
        });
        Ok(region)
    }
}

/// Load a WAV file as a clip placed at `position`.
pub fn load_wav_clip(path: impl AsRef<Path>, position: u64) -> Result<Clip> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok(Clip::new(position, spec.channels as usize, samples))
}
