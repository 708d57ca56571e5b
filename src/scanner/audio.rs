//! Envelope fingerprints for similar-audio detection.
//!
//! Audio is read from RIFF/WAVE files holding integer PCM (8, 16, 24 or
//! 32 bit) or 32-bit float samples. The recording is split into a fixed
//! number of equal time segments and each cell of the digest is the mean
//! absolute amplitude of its segment, normalised so the loudest segment
//! is 255. Normalisation makes the digest insensitive to overall volume
//! while keeping the shape of the recording.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use super::fingerprint::{BlockDigest, Fingerprint};
use super::ExtractionError;

/// Default number of time segments.
pub const DEFAULT_SEGMENTS: u32 = 64;

/// Smallest accepted segment count.
pub const MIN_SEGMENTS: u32 = 2;

/// Largest accepted segment count.
pub const MAX_SEGMENTS: u32 = 1024;

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Bytes of sample data decoded per read.
const READ_BUFFER: usize = 64 * 1024;

/// Sample encoding found in the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleFormat {
    Int(u16),
    Float32,
}

#[derive(Debug, Clone, Copy)]
struct WaveFormat {
    channels: u16,
    sample: SampleFormat,
}

impl WaveFormat {
    fn bytes_per_sample(self) -> usize {
        match self.sample {
            SampleFormat::Int(bits) => usize::from(bits / 8),
            SampleFormat::Float32 => 4,
        }
    }

    fn frame_size(self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Absolute amplitude of one sample in `0.0..=1.0`.
    fn amplitude(self, bytes: &[u8]) -> f64 {
        match self.sample {
            SampleFormat::Int(8) => (f64::from(bytes[0]) - 128.0).abs() / 128.0,
            SampleFormat::Int(16) => {
                f64::from(i16::from_le_bytes([bytes[0], bytes[1]])).abs() / 32_768.0
            }
            SampleFormat::Int(24) => {
                let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
                f64::from(value).abs() / 8_388_608.0
            }
            SampleFormat::Int(_) => {
                let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                f64::from(value).abs() / 2_147_483_648.0
            }
            SampleFormat::Float32 => {
                let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if value.is_finite() {
                    f64::from(value.abs()).min(1.0)
                } else {
                    0.0
                }
            }
        }
    }
}

/// Computes amplitude-envelope digests for audio files.
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    segments: u32,
}

impl AudioExtractor {
    /// Create an extractor producing `segments` cells.
    ///
    /// Values outside `2..=1024` are clamped.
    #[must_use]
    pub fn new(segments: u32) -> Self {
        Self {
            segments: segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS),
        }
    }

    /// Number of cells per digest.
    #[must_use]
    pub fn segments(&self) -> u32 {
        self.segments
    }

    /// Parse a WAVE file and compute its envelope digest.
    ///
    /// # Errors
    ///
    /// - [`ExtractionError::UnsupportedFormat`] for non-RIFF/WAVE content or
    ///   sample encodings other than integer PCM and 32-bit float
    /// - [`ExtractionError::Decode`] for malformed chunks or recordings
    ///   without any complete frame
    /// - The mapped I/O error if the file cannot be read
    pub fn digest_file(&self, path: &Path) -> Result<BlockDigest, ExtractionError> {
        let file = File::open(path).map_err(|e| ExtractionError::from_io(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| ExtractionError::from_io(path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 12];
        if read_full(&mut reader, &mut header).map_err(|e| ExtractionError::from_io(path, e))? < 12
            || &header[0..4] != b"RIFF"
            || &header[8..12] != b"WAVE"
        {
            return Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: "not a RIFF/WAVE file".to_string(),
            });
        }

        let mut format: Option<WaveFormat> = None;
        loop {
            let mut chunk_header = [0u8; 8];
            let read = read_full(&mut reader, &mut chunk_header)
                .map_err(|e| ExtractionError::from_io(path, e))?;
            if read < 8 {
                return Err(decode_error(path, "missing data chunk"));
            }
            let id = [chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]];
            let size = u32::from_le_bytes([
                chunk_header[4],
                chunk_header[5],
                chunk_header[6],
                chunk_header[7],
            ]);

            match &id {
                b"fmt " => {
                    format = Some(read_format(path, &mut reader, size)?);
                }
                b"data" => {
                    let format = format.ok_or_else(|| decode_error(path, "data chunk before fmt chunk"))?;
                    // Truncated files keep whatever complete frames they contain.
                    let offset = reader
                        .stream_position()
                        .map_err(|e| ExtractionError::from_io(path, e))?;
                    let present = u64::from(size).min(file_len.saturating_sub(offset));
                    return self.digest_samples(path, &mut reader, format, present);
                }
                _ => {
                    let skip = i64::from(size) + i64::from(size & 1);
                    reader
                        .seek_relative(skip)
                        .map_err(|e| ExtractionError::from_io(path, e))?;
                }
            }
        }
    }

    /// Stream `data_size` bytes of frames from `reader` into the envelope.
    ///
    /// Memory use is one fixed read buffer regardless of the recording's
    /// length. Frames are assigned to segments by their position among the
    /// `data_size / frame_size` expected frames; if the stream ends early,
    /// the segments it never reached repeat the last measured one.
    fn digest_samples<R: Read>(
        &self,
        path: &Path,
        reader: &mut R,
        format: WaveFormat,
        data_size: u64,
    ) -> Result<BlockDigest, ExtractionError> {
        let frame_size = format.frame_size();
        let total_frames = data_size / frame_size as u64;
        if total_frames == 0 {
            return Err(decode_error(path, "no audio frames"));
        }

        let segments = u64::from(self.segments);
        let mut sums = vec![0.0f64; self.segments as usize];
        let mut counts = vec![0u64; self.segments as usize];
        let sample_size = format.bytes_per_sample();

        let mut buffer = vec![0u8; frame_size * (READ_BUFFER / frame_size).max(1)];
        let mut samples = reader.take(total_frames * frame_size as u64);
        let mut index = 0u64;
        loop {
            let read =
                read_full(&mut samples, &mut buffer).map_err(|e| ExtractionError::from_io(path, e))?;
            for frame in buffer[..read].chunks_exact(frame_size) {
                let mono: f64 = frame
                    .chunks_exact(sample_size)
                    .map(|sample| format.amplitude(sample))
                    .sum::<f64>()
                    / f64::from(format.channels);
                let segment = (index * segments / total_frames) as usize;
                sums[segment] += mono;
                counts[segment] += 1;
                index += 1;
            }
            if read < buffer.len() {
                break;
            }
        }
        if index == 0 {
            return Err(decode_error(path, "no complete audio frames"));
        }
        if index < total_frames {
            log::debug!(
                "{}: read {} of {} audio frames",
                path.display(),
                index,
                total_frames
            );
        }

        // Recordings shorter than the segment count, or cut short while
        // reading, leave gaps; repeat the previous segment so every cell
        // has a value.
        let mut means = Vec::with_capacity(sums.len());
        let mut last = 0.0;
        for (sum, count) in sums.iter().zip(&counts) {
            if *count > 0 {
                last = sum / *count as f64;
            }
            means.push(last);
        }

        let peak = means.iter().copied().fold(0.0f64, f64::max);
        let cells = if peak > 0.0 {
            means
                .iter()
                .map(|m| (m / peak * 255.0).round().clamp(0.0, 255.0) as u8)
                .collect()
        } else {
            vec![0u8; means.len()]
        };

        Ok(BlockDigest::new(cells))
    }
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENTS)
    }
}

impl super::Extract for AudioExtractor {
    fn namespace(&self) -> String {
        format!("audio/{}", self.segments)
    }

    fn extract_path(&self, path: &Path) -> Result<Fingerprint, ExtractionError> {
        self.digest_file(path).map(Fingerprint::Audio)
    }
}

fn read_format<R: Read>(
    path: &Path,
    reader: &mut R,
    size: u32,
) -> Result<WaveFormat, ExtractionError> {
    if size < 16 {
        return Err(decode_error(path, "fmt chunk too short"));
    }
    let padded = size as usize + (size as usize & 1);
    let mut body = vec![0u8; padded];
    let read = read_full(reader, &mut body).map_err(|e| ExtractionError::from_io(path, e))?;
    if read < size as usize {
        return Err(decode_error(path, "truncated fmt chunk"));
    }

    let mut tag = u16::from_le_bytes([body[0], body[1]]);
    let channels = u16::from_le_bytes([body[2], body[3]]);
    let bits = u16::from_le_bytes([body[14], body[15]]);

    if tag == FORMAT_EXTENSIBLE {
        if size < 26 {
            return Err(decode_error(path, "extensible fmt chunk too short"));
        }
        tag = u16::from_le_bytes([body[24], body[25]]);
    }

    if channels == 0 {
        return Err(decode_error(path, "zero channels"));
    }

    let sample = match (tag, bits) {
        (FORMAT_PCM, 8 | 16 | 24 | 32) => SampleFormat::Int(bits),
        (FORMAT_FLOAT, 32) => SampleFormat::Float32,
        _ => {
            return Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format!("WAVE format tag {tag:#06x} with {bits} bits per sample"),
            })
        }
    };

    Ok(WaveFormat { channels, sample })
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn decode_error(path: &Path, reason: &str) -> ExtractionError {
    ExtractionError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
