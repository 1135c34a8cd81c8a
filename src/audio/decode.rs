use std::io::{Cursor, Write};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Decoded audio, mixed down to a single channel
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f32 / self.sample_rate as f32
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized or unsupported audio format: {0}")]
    Probe(String),
    #[error("no decodable audio track in stream")]
    NoAudioTrack,
    #[error("audio decode failed: {0}")]
    Decode(String),
    #[error("decoded stream contained no samples")]
    Empty,
    #[error("temporary file error: {0}")]
    TempFile(#[from] std::io::Error),
}

/// Decode encoded audio bytes into a mono waveform.
///
/// Tries an in-memory probe first. Some containers (notably M4A) probe
/// unreliably from a bare buffer, so a failure is retried once through a
/// named temporary file carrying the extension hint; the file is removed
/// when its handle drops, on success and failure alike.
pub fn decode_bytes(
    bytes: &[u8],
    extension_hint: Option<&str>,
) -> Result<DecodedAudio, DecodeError> {
    let cursor = Cursor::new(bytes.to_vec());
    match decode_source(Box::new(cursor), extension_hint) {
        Ok(audio) => Ok(audio),
        Err(first_error) => {
            log::debug!("in-memory decode failed ({first_error}), retrying via temporary file");
            decode_via_temp_file(bytes, extension_hint)
        }
    }
}

fn decode_via_temp_file(
    bytes: &[u8],
    extension_hint: Option<&str>,
) -> Result<DecodedAudio, DecodeError> {
    let suffix = format!(".{}", extension_hint.unwrap_or("m4a"));
    let mut temp = tempfile::Builder::new().suffix(&suffix).tempfile()?;
    temp.write_all(bytes)?;
    temp.flush()?;
    let file = temp.reopen()?;
    // `temp` stays alive until the decode finishes so the file outlives its reader
    decode_source(Box::new(file), extension_hint)
}

fn decode_source(
    source: Box<dyn MediaSource>,
    extension_hint: Option<&str>,
) -> Result<DecodedAudio, DecodeError> {
    let media_source = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension_hint {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            media_source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            // End of stream surfaces as an unexpected EOF
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                }

                let mut sample_buffer = SampleBuffer::<f32>::new(duration, spec);
                sample_buffer.copy_interleaved_ref(decoded);

                push_mono(&mut samples, sample_buffer.samples(), spec.channels.count());
            }
            // A malformed packet is recoverable; keep going with the rest of the stream
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("skipping malformed packet: {e}");
                continue;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to one
fn push_mono(samples: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        samples.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        samples.push(frame.iter().sum::<f32>() / channels as f32);
    }
}
