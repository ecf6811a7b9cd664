//! # WAV Container Layout
//!
//! Speech synthesis returns audio wrapped in a RIFF/WAVE container. The bridge
//! only needs to know where the header ends and what the `fmt ` chunk says, so
//! this module walks the chunk list instead of decoding samples.
//!
//! ## Chunk Layout:
//! ```text
//! "RIFF" <u32 size> "WAVE"
//!   "fmt " <u32 len> <format tag, channels, rate, byte rate, align, bits> [extra]
//!   ... optional chunks ("fact", "LIST", ...)
//!   "data" <u32 len> <samples>
//! ```
//! The header length is the offset of the first sample byte.

use crate::audio::frame::AudioParams;
use crate::error::PipelineError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Size of the canonical header: RIFF (12) + 16-byte `fmt ` chunk (24) + `data` header (8).
pub const CANONICAL_HEADER_LEN: usize = 44;

/// What a WAV header says about the samples that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavLayout {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Offset of the first sample byte, i.e. the header length
    pub data_offset: usize,
    /// Sample bytes in the `data` chunk, capped at what the buffer holds
    pub data_len: usize,
}

impl WavLayout {
    /// Whether the samples are already in the given raw format.
    pub fn matches(&self, params: &AudioParams) -> bool {
        self.format_tag == params.encoding.wav_format_tag()
            && self.channels == params.channels
            && self.sample_rate == params.sample_rate
            && self.bits_per_sample == params.encoding.bits_per_sample()
    }
}

fn violation(detail: impl Into<String>) -> PipelineError {
    PipelineError::FormatInvariantViolation(detail.into())
}

fn read_tag(cursor: &mut Cursor<&[u8]>) -> Result<[u8; 4], PipelineError> {
    let mut tag = [0u8; 4];
    cursor
        .read_exact(&mut tag)
        .map_err(|_| violation("truncated WAV chunk header"))?;
    Ok(tag)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, PipelineError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| violation("truncated WAV chunk size"))
}

/// Locate the `fmt ` and `data` chunks of a WAV byte buffer.
///
/// ## Errors:
/// Anything that is not a well-formed RIFF/WAVE buffer with both chunks is a
/// `FormatInvariantViolation`: the bridge cannot tell where the audio starts.
pub fn parse_wav(bytes: &[u8]) -> Result<WavLayout, PipelineError> {
    let mut cursor = Cursor::new(bytes);

    if &read_tag(&mut cursor)? != b"RIFF" {
        return Err(violation("missing RIFF signature"));
    }
    let _riff_size = read_u32(&mut cursor)?;
    if &read_tag(&mut cursor)? != b"WAVE" {
        return Err(violation("missing WAVE form type"));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;

    loop {
        let tag = read_tag(&mut cursor)?;
        let size = read_u32(&mut cursor)? as u64;
        let body_start = cursor.position();

        match &tag {
            b"fmt " => {
                if size < 16 {
                    return Err(violation(format!("fmt chunk too short ({} bytes)", size)));
                }
                let io = |_| violation("truncated fmt chunk");
                let format_tag = cursor.read_u16::<LittleEndian>().map_err(io)?;
                let channels = cursor.read_u16::<LittleEndian>().map_err(io)?;
                let sample_rate = cursor.read_u32::<LittleEndian>().map_err(io)?;
                let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(io)?;
                let _block_align = cursor.read_u16::<LittleEndian>().map_err(io)?;
                let bits_per_sample = cursor.read_u16::<LittleEndian>().map_err(io)?;
                format = Some((format_tag, channels, sample_rate, bits_per_sample));
            }
            b"data" => {
                let (format_tag, channels, sample_rate, bits_per_sample) =
                    format.ok_or_else(|| violation("data chunk precedes fmt chunk"))?;
                let data_offset = body_start as usize;
                return Ok(WavLayout {
                    format_tag,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_offset,
                    data_len: (size as usize).min(bytes.len().saturating_sub(data_offset)),
                });
            }
            _ => {}
        }

        // Chunks are word aligned: odd sizes carry one pad byte.
        let next = body_start + size + (size & 1);
        if next > bytes.len() as u64 {
            return Err(violation(format!(
                "chunk {:?} runs past the end of the buffer",
                String::from_utf8_lossy(&tag)
            )));
        }
        cursor
            .seek(SeekFrom::Start(next))
            .map_err(|_| violation("unable to seek to next chunk"))?;
    }
}

/// Build a canonical 44-byte WAV header for `data_len` bytes in `params` format.
pub fn wav_header(params: &AudioParams, data_len: u32) -> Vec<u8> {
    let bits = params.encoding.bits_per_sample();
    let block_align = params.channels * bits / 8;
    let byte_rate = params.sample_rate * u32::from(block_align);

    let mut header = Vec::with_capacity(CANONICAL_HEADER_LEN);
    // Writes into a Vec cannot fail.
    header.extend_from_slice(b"RIFF");
    let _ = header.write_u32::<LittleEndian>(36 + data_len);
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    let _ = header.write_u32::<LittleEndian>(16);
    let _ = header.write_u16::<LittleEndian>(params.encoding.wav_format_tag());
    let _ = header.write_u16::<LittleEndian>(params.channels);
    let _ = header.write_u32::<LittleEndian>(params.sample_rate);
    let _ = header.write_u32::<LittleEndian>(byte_rate);
    let _ = header.write_u16::<LittleEndian>(block_align);
    let _ = header.write_u16::<LittleEndian>(bits);
    header.extend_from_slice(b"data");
    let _ = header.write_u32::<LittleEndian>(data_len);
    header
}

/// Wrap raw samples in a canonical WAV container.
#[cfg(test)]
pub(crate) fn wrap_wav(params: &AudioParams, samples: &[u8]) -> Vec<u8> {
    let mut bytes = wav_header(params, samples.len() as u32);
    bytes.extend_from_slice(samples);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_header_layout() {
        let header = wav_header(&AudioParams::TELEPHONY, 800);
        assert_eq!(header.len(), CANONICAL_HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn test_parse_canonical_wav() {
        let samples = vec![0x7Fu8; 320];
        let layout = parse_wav(&wrap_wav(&AudioParams::TELEPHONY, &samples)).unwrap();
        assert_eq!(layout.data_offset, 44);
        assert_eq!(layout.data_len, 320);
        assert_eq!(layout.sample_rate, 8000);
        assert!(layout.matches(&AudioParams::TELEPHONY));
    }

    #[test]
    fn test_parse_skips_extra_chunks() {
        // RIFF header, fmt chunk with 2 extension bytes, a fact chunk, then data.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.write_u32::<LittleEndian>(18).unwrap();
        bytes.write_u16::<LittleEndian>(7).unwrap();
        bytes.write_u16::<LittleEndian>(1).unwrap();
        bytes.write_u32::<LittleEndian>(8000).unwrap();
        bytes.write_u32::<LittleEndian>(8000).unwrap();
        bytes.write_u16::<LittleEndian>(1).unwrap();
        bytes.write_u16::<LittleEndian>(8).unwrap();
        bytes.write_u16::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(b"fact");
        bytes.write_u32::<LittleEndian>(4).unwrap();
        bytes.write_u32::<LittleEndian>(10).unwrap();
        bytes.extend_from_slice(b"data");
        bytes.write_u32::<LittleEndian>(10).unwrap();
        bytes.extend_from_slice(&[0xFF; 10]);

        let layout = parse_wav(&bytes).unwrap();
        assert_eq!(layout.data_offset, 58);
        assert_eq!(layout.data_len, 10);
        assert!(layout.matches(&AudioParams::TELEPHONY));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_wav(b"ID3\x04 not a wav file").unwrap_err();
        assert!(matches!(err, PipelineError::FormatInvariantViolation(_)));

        let truncated = &wav_header(&AudioParams::TELEPHONY, 0)[..20];
        assert!(parse_wav(truncated).is_err());
    }
    #[test]
    fn test_data_len_stops_at_declared_chunk_size() {
        let mut bytes = wrap_wav(&AudioParams::TELEPHONY, &[0x7F; 8]);
        bytes.extend_from_slice(b"LIST");
        bytes.write_u32::<LittleEndian>(4).unwrap();
        bytes.extend_from_slice(b"INFO");

        let layout = parse_wav(&bytes).unwrap();
        assert_eq!(layout.data_offset, 44);
        assert_eq!(layout.data_len, 8);
    }

    #[test]
    fn test_data_len_capped_by_truncated_buffer() {
        let mut bytes = wav_header(&AudioParams::TELEPHONY, 1000);
        bytes.extend_from_slice(&[0xFF; 10]);

        assert_eq!(parse_wav(&bytes).unwrap().data_len, 10);
    }
}
