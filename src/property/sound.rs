use std::sync::Arc;
use thiserror::Error;

use crate::reader::{self, read_u16_at, read_u32_at};
use crate::WzReader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Error)]
pub enum WzSoundError {
    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// Media headers of `Sound_DX8` frames are 0x46 bytes when they wrap a
/// WAVEFORMATEX, with the format struct at 0x34.
const WAVE_HEADER_LEN: usize = 0x46;
const WAVE_FORMAT_AT: usize = 0x34;

const FORMAT_TAG_PCM: u16 = 0x01;
const FORMAT_TAG_MP3: u16 = 0x55;

/// The WAVEFORMATEX block of a sound frame's media header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormatEx {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        Some(Self {
            format_tag: read_u16_at(buf, 0).ok()?,
            channels: read_u16_at(buf, 2).ok()?,
            samples_per_sec: read_u32_at(buf, 4).ok()?,
            avg_bytes_per_sec: read_u32_at(buf, 8).ok()?,
            block_align: read_u16_at(buf, 12).ok()?,
            bits_per_sample: read_u16_at(buf, 14).ok()?,
        })
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WzSoundKind {
    Mp3,
    Pcm,
    /// PCM-tagged payload that is really an opaque blob: duration pinned
    /// to 1000ms and the sample rate equal to the byte length.
    Binary,
    #[default]
    Unknown,
}

/// A sound leaf: the raw payload location plus the parsed media header.
#[derive(Debug, Clone)]
pub struct WzSound {
    pub reader: Arc<WzReader>,
    /// file-absolute start of the payload
    pub offset: usize,
    pub data_length: usize,
    /// playback length in milliseconds
    pub duration: u32,
    pub header_offset: usize,
    pub header_size: usize,
    pub kind: WzSoundKind,
    pub wave_format: Option<WaveFormatEx>,
}

/// Classify a sound frame from its media-type header bytes.
pub fn classify_sound(
    header: &[u8],
    data_length: usize,
    duration: u32,
) -> (WzSoundKind, Option<WaveFormatEx>) {
    if header.len() != WAVE_HEADER_LEN {
        return (WzSoundKind::Mp3, None);
    }

    let format = header
        .get(WAVE_FORMAT_AT..WAVE_FORMAT_AT + 16)
        .and_then(WaveFormatEx::from_bytes);
    let Some(format) = format else {
        return (WzSoundKind::Unknown, None);
    };

    let kind = match format.format_tag {
        FORMAT_TAG_PCM => {
            if duration == 1000 && format.samples_per_sec as usize == data_length {
                WzSoundKind::Binary
            } else {
                WzSoundKind::Pcm
            }
        }
        FORMAT_TAG_MP3 => WzSoundKind::Mp3,
        other => {
            tracing::warn!("unrecognized sound format tag {other:#06x}");
            WzSoundKind::Unknown
        }
    };

    (kind, Some(format))
}

impl WzSound {
    /// Build a descriptor from the frame layout: the header bytes sit
    /// between the duration field and the payload.
    pub fn from_frame(
        reader: &Arc<WzReader>,
        offset: usize,
        data_length: usize,
        duration: u32,
        header_offset: usize,
        header_size: usize,
    ) -> Result<Self, WzSoundError> {
        let header = reader.get_slice(header_offset..header_offset + header_size)?;
        let (kind, wave_format) = classify_sound(header, data_length, duration);

        Ok(Self {
            reader: Arc::clone(reader),
            offset,
            data_length,
            duration,
            header_offset,
            header_size,
            kind,
            wave_format,
        })
    }

    /// The canonical 44-byte RIFF/WAVE header for a PCM payload.
    pub fn wav_header(&self) -> Option<Vec<u8>> {
        let format = self.wave_format.as_ref()?;
        let data_length = self.data_length as u32;

        let mut out = Vec::with_capacity(44);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(data_length + 36).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16_u32.to_le_bytes());
        out.extend_from_slice(&format.format_tag.to_le_bytes());
        out.extend_from_slice(&format.channels.to_le_bytes());
        out.extend_from_slice(&format.samples_per_sec.to_le_bytes());
        out.extend_from_slice(&format.avg_bytes_per_sec.to_le_bytes());
        out.extend_from_slice(&format.block_align.to_le_bytes());
        out.extend_from_slice(&format.bits_per_sample.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_length.to_le_bytes());
        Some(out)
    }

    /// The playable byte buffer: raw payload for MP3 and blobs, a
    /// synthesized WAV file for PCM.
    pub fn extract(&self) -> Result<Vec<u8>, WzSoundError> {
        let payload = self
            .reader
            .get_slice(self.offset..self.offset + self.data_length)?;

        match (self.kind, self.wav_header()) {
            (WzSoundKind::Pcm, Some(header)) => {
                let mut out = Vec::with_capacity(44 + payload.len());
                out.extend_from_slice(&header);
                out.extend_from_slice(payload);
                Ok(out)
            }
            _ => Ok(payload.to_vec()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn wave_header(format_tag: u16, samples_per_sec: u32) -> Vec<u8> {
        let mut header = vec![0_u8; WAVE_HEADER_LEN];
        header[WAVE_FORMAT_AT..WAVE_FORMAT_AT + 2].copy_from_slice(&format_tag.to_le_bytes());
        header[WAVE_FORMAT_AT + 2..WAVE_FORMAT_AT + 4].copy_from_slice(&2_u16.to_le_bytes());
        header[WAVE_FORMAT_AT + 4..WAVE_FORMAT_AT + 8]
            .copy_from_slice(&samples_per_sec.to_le_bytes());
        header[WAVE_FORMAT_AT + 8..WAVE_FORMAT_AT + 12]
            .copy_from_slice(&176_400_u32.to_le_bytes());
        header[WAVE_FORMAT_AT + 12..WAVE_FORMAT_AT + 14].copy_from_slice(&4_u16.to_le_bytes());
        header[WAVE_FORMAT_AT + 14..WAVE_FORMAT_AT + 16].copy_from_slice(&16_u16.to_le_bytes());
        header
    }

    #[test]
    fn pcm_header_classifies() {
        let header = wave_header(FORMAT_TAG_PCM, 44_100);
        let (kind, format) = classify_sound(&header, 1_000_000, 5_000);
        assert_eq!(kind, WzSoundKind::Pcm);
        assert_eq!(format.unwrap().samples_per_sec, 44_100);
    }

    #[test]
    fn pinned_duration_means_binary_blob() {
        let header = wave_header(FORMAT_TAG_PCM, 512);
        let (kind, _) = classify_sound(&header, 512, 1000);
        assert_eq!(kind, WzSoundKind::Binary);
    }

    #[test]
    fn mp3_layer3_and_short_headers() {
        let header = wave_header(FORMAT_TAG_MP3, 44_100);
        assert_eq!(classify_sound(&header, 10, 10).0, WzSoundKind::Mp3);
        assert_eq!(classify_sound(&[0; 24], 10, 10).0, WzSoundKind::Mp3);
    }

    #[test]
    fn pcm_extraction_synthesizes_wav() {
        let pcm_payload = [1_u8, 2, 3, 4, 5, 6, 7, 8];
        let mut file = wave_header(FORMAT_TAG_PCM, 44_100);
        let header_len = file.len();
        file.extend_from_slice(&pcm_payload);

        let reader = Arc::new(WzReader::from_buff(&file));
        let sound = WzSound::from_frame(
            &reader,
            header_len,
            pcm_payload.len(),
            5_000,
            0,
            header_len,
        )
        .unwrap();
        assert_eq!(sound.kind, WzSoundKind::Pcm);

        let wav = sound.extract().unwrap();
        assert_eq!(wav.len(), 44 + pcm_payload.len());
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(
            wav[40..44],
            (pcm_payload.len() as u32).to_le_bytes()
        );
        assert_eq!(&wav[44..], &pcm_payload);

        // fields land where a WAVEFORMATEX says they should
        assert_eq!(wav[20..22], FORMAT_TAG_PCM.to_le_bytes());
        assert_eq!(wav[24..28], 44_100_u32.to_le_bytes());
    }

    #[test]
    fn mp3_extraction_is_raw() {
        let payload = [0xFF_u8, 0xFB, 0x90, 0x00];
        let reader = Arc::new(WzReader::from_buff(&payload));
        let sound = WzSound::from_frame(&reader, 0, payload.len(), 1234, 0, 0).unwrap();

        assert_eq!(sound.kind, WzSoundKind::Mp3);
        assert_eq!(sound.extract().unwrap(), payload);
    }
}
