//! Audio and video container probing.
//!
//! Reads just enough of a container's header structures to recognise it and
//! pull out its duration and, for video, its frame size. Nothing is decoded.

use tootbox_common::{AppError, AppResult};

/// Recognised containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ISO base media (`ftyp` box), video brands.
    Mp4,
    /// `QuickTime` (`ftyp` brand `qt  `).
    QuickTime,
    /// ISO base media with an audio-only brand.
    M4a,
    /// WebM / Matroska (EBML).
    WebM,
    /// MPEG audio, with or without an `ID3v2` tag.
    Mp3,
    /// Ogg pages.
    Ogg,
    /// Native FLAC.
    Flac,
    /// RIFF WAVE.
    Wav,
}

impl Container {
    /// MIME type to store the original under.
    #[must_use]
    pub const fn mime_type(&self, video: bool) -> &'static str {
        match (self, video) {
            (Self::Mp4, true) => "video/mp4",
            (Self::QuickTime, _) => "video/quicktime",
            (Self::Mp4 | Self::M4a, false) => "audio/mp4",
            (Self::M4a, true) => "video/mp4",
            (Self::WebM, true) => "video/webm",
            (Self::WebM, false) => "audio/webm",
            (Self::Ogg, true) => "video/ogg",
            (Self::Ogg, false) => "audio/ogg",
            (Self::Mp3, _) => "audio/mpeg",
            (Self::Flac, _) => "audio/flac",
            (Self::Wav, _) => "audio/wav",
        }
    }

    /// File extension for stored originals.
    #[must_use]
    pub const fn extension(&self, video: bool) -> &'static str {
        match (self, video) {
            (Self::Mp4 | Self::M4a, true) => "mp4",
            (Self::Mp4 | Self::M4a, false) => "m4a",
            (Self::QuickTime, _) => "mov",
            (Self::WebM, _) => "webm",
            (Self::Ogg, _) => "ogg",
            (Self::Mp3, _) => "mp3",
            (Self::Flac, _) => "flac",
            (Self::Wav, _) => "wav",
        }
    }

    /// Whether the container can carry a video track.
    #[must_use]
    pub const fn can_hold_video(&self) -> bool {
        matches!(
            self,
            Self::Mp4 | Self::QuickTime | Self::M4a | Self::WebM | Self::Ogg
        )
    }
}

/// What probing found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub container: Container,
    /// Frame size of the first video track.
    pub dimensions: Option<(u32, u32)>,
    /// Running time in seconds.
    pub duration: Option<f64>,
}

/// Identify a container from its leading bytes.
#[must_use]
pub fn sniff_container(data: &[u8]) -> Option<Container> {
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some(match &data[8..12] {
            b"qt  " => Container::QuickTime,
            b"M4A " | b"M4B " | b"M4P " => Container::M4a,
            _ => Container::Mp4,
        });
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(Container::WebM);
    }
    if data.starts_with(b"OggS") {
        return Some(Container::Ogg);
    }
    if data.starts_with(b"fLaC") {
        return Some(Container::Flac);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WAVE" {
        return Some(Container::Wav);
    }
    if data.starts_with(b"ID3") || mp3_frame_header(data, 0).is_some() {
        return Some(Container::Mp3);
    }
    None
}

/// Probe a container.
pub fn probe(data: &[u8]) -> AppResult<ProbeResult> {
    let container = sniff_container(data)
        .ok_or_else(|| AppError::Decode("Unrecognized audio/video container".to_string()))?;

    let (dimensions, duration) = match container {
        Container::Mp4 | Container::QuickTime | Container::M4a => probe_mp4(data)?,
        Container::WebM => probe_ebml(data)?,
        Container::Mp3 => (None, probe_mp3(data)?),
        Container::Ogg => (None, probe_ogg(data)?),
        Container::Flac => (None, probe_flac(data)?),
        Container::Wav => (None, probe_wav(data)?),
    };

    Ok(ProbeResult {
        container,
        dimensions,
        duration,
    })
}

fn truncated(what: &str) -> AppError {
    AppError::Decode(format!("Truncated or corrupt {what} header"))
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8).map(|b| {
        u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_u64(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8).map(|b| {
        u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

// === ISO base media (MP4 / QuickTime / M4A) ===

/// Iterate the boxes directly inside `data`, yielding `(type, body)`.
fn mp4_boxes(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let size = be_u32(data, pos)? as usize;
        let kind: [u8; 4] = data.get(pos + 4..pos + 8)?.try_into().ok()?;
        let (header, total) = match size {
            0 => (8, data.len() - pos),
            1 => (16, usize::try_from(be_u64(data, pos + 8)?).ok()?),
            n => (8, n),
        };
        if total < header {
            return None;
        }
        let end = pos.checked_add(total)?.min(data.len());
        let body = data.get(pos + header..end)?;
        pos = end;
        Some((kind, body))
    })
}

fn probe_mp4(data: &[u8]) -> AppResult<(Option<(u32, u32)>, Option<f64>)> {
    let moov = mp4_boxes(data)
        .find(|(kind, _)| kind == b"moov")
        .map(|(_, body)| body)
        .ok_or_else(|| truncated("MP4 (no moov box)"))?;

    let duration = mp4_boxes(moov)
        .find(|(kind, _)| kind == b"mvhd")
        .and_then(|(_, body)| mvhd_duration(body));

    let dimensions = mp4_boxes(moov)
        .filter(|(kind, _)| kind == b"trak")
        .filter_map(|(_, trak)| mp4_boxes(trak).find(|(kind, _)| kind == b"tkhd"))
        .filter_map(|(_, tkhd)| tkhd_dimensions(tkhd))
        .find(|&(w, h)| w > 0 && h > 0);

    Ok((dimensions, duration))
}

fn mvhd_duration(body: &[u8]) -> Option<f64> {
    let (timescale, duration) = match body.first()? {
        0 => (be_u32(body, 12)?, u64::from(be_u32(body, 16)?)),
        1 => (be_u32(body, 20)?, be_u64(body, 24)?),
        _ => return None,
    };
    if timescale == 0 {
        return None;
    }
    Some(duration as f64 / f64::from(timescale))
}

fn tkhd_dimensions(body: &[u8]) -> Option<(u32, u32)> {
    // Width and height are 16.16 fixed point after the transformation matrix.
    let offset = match body.first()? {
        0 => 4 + 72,
        1 => 4 + 84,
        _ => return None,
    };
    let width = be_u32(body, offset)? >> 16;
    let height = be_u32(body, offset + 4)? >> 16;
    Some((width, height))
}

// === EBML (WebM / Matroska) ===

const EBML_SEGMENT: u32 = 0x1853_8067;
const EBML_INFO: u32 = 0x1549_A966;
const EBML_TIMECODE_SCALE: u32 = 0x2A_D7B1;
const EBML_DURATION: u32 = 0x4489;
const EBML_TRACKS: u32 = 0x1654_AE6B;
const EBML_TRACK_ENTRY: u32 = 0xAE;
const EBML_VIDEO: u32 = 0xE0;
const EBML_PIXEL_WIDTH: u32 = 0xB0;
const EBML_PIXEL_HEIGHT: u32 = 0xBA;
const EBML_CLUSTER: u32 = 0x1F43_B675;

/// Read an element id (marker bits kept). Returns `(id, length)`.
fn ebml_id(data: &[u8], pos: usize) -> Option<(u32, usize)> {
    let first = *data.get(pos)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return None;
    }
    let mut id = 0u32;
    for i in 0..len {
        id = (id << 8) | u32::from(*data.get(pos + i)?);
    }
    Some((id, len))
}

/// Read an element size (marker bit stripped). `None` size means unknown.
fn ebml_size(data: &[u8], pos: usize) -> Option<(Option<u64>, usize)> {
    let first = *data.get(pos)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return None;
    }
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let mut value = u64::from(first & mask);
    let mut all_ones = value == u64::from(mask);
    for i in 1..len {
        let byte = *data.get(pos + i)?;
        all_ones &= byte == 0xFF;
        value = (value << 8) | u64::from(byte);
    }
    Some(((!all_ones).then_some(value), len))
}

/// Iterate the elements directly inside `data`, yielding `(id, body)`.
fn ebml_elements(data: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let (id, id_len) = ebml_id(data, pos)?;
        let (size, size_len) = ebml_size(data, pos + id_len)?;
        let start = pos + id_len + size_len;
        let end = match size {
            Some(size) => start
                .checked_add(usize::try_from(size).ok()?)?
                .min(data.len()),
            None => data.len(),
        };
        let body = data.get(start..end)?;
        pos = end;
        Some((id, body))
    })
}

fn ebml_uint(body: &[u8]) -> Option<u64> {
    if body.is_empty() || body.len() > 8 {
        return None;
    }
    Some(body.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn ebml_float(body: &[u8]) -> Option<f64> {
    match body.len() {
        4 => Some(f64::from(f32::from_bits(be_u32(body, 0)?))),
        8 => Some(f64::from_bits(be_u64(body, 0)?)),
        _ => None,
    }
}

fn probe_ebml(data: &[u8]) -> AppResult<(Option<(u32, u32)>, Option<f64>)> {
    let segment = ebml_elements(data)
        .find(|(id, _)| *id == EBML_SEGMENT)
        .map(|(_, body)| body)
        .ok_or_else(|| truncated("WebM (no segment)"))?;

    let mut timecode_scale = 1_000_000u64;
    let mut raw_duration = None;
    let mut dimensions = None;

    for (id, body) in ebml_elements(segment) {
        match id {
            EBML_INFO => {
                for (id, field) in ebml_elements(body) {
                    match id {
                        EBML_TIMECODE_SCALE => {
                            timecode_scale = ebml_uint(field).unwrap_or(timecode_scale);
                        }
                        EBML_DURATION => raw_duration = ebml_float(field),
                        _ => {}
                    }
                }
            }
            EBML_TRACKS if dimensions.is_none() => {
                dimensions = ebml_elements(body)
                    .filter(|(id, _)| *id == EBML_TRACK_ENTRY)
                    .filter_map(|(_, entry)| {
                        ebml_elements(entry).find(|(id, _)| *id == EBML_VIDEO)
                    })
                    .find_map(|(_, video)| {
                        let mut width = None;
                        let mut height = None;
                        for (id, field) in ebml_elements(video) {
                            match id {
                                EBML_PIXEL_WIDTH => width = ebml_uint(field),
                                EBML_PIXEL_HEIGHT => height = ebml_uint(field),
                                _ => {}
                            }
                        }
                        Some((u32::try_from(width?).ok()?, u32::try_from(height?).ok()?))
                    });
            }
            EBML_CLUSTER => break,
            _ => {}
        }
    }

    let duration = raw_duration
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d * timecode_scale as f64 / 1e9);

    Ok((dimensions, duration))
}

// === MPEG audio ===

const MP3_BITRATES_V1_L3: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const MP3_BITRATES_V2_L3: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

/// Bitrate (kbit/s) of a Layer III frame header at `pos`.
fn mp3_frame_header(data: &[u8], pos: usize) -> Option<u32> {
    let header = be_u32(data, pos)?;
    if header >> 21 != 0x7FF {
        return None;
    }
    let version = (header >> 19) & 0b11;
    let layer = (header >> 17) & 0b11;
    let bitrate_index = ((header >> 12) & 0b1111) as usize;
    let sample_rate_index = (header >> 10) & 0b11;
    if version == 0b01 || layer != 0b01 || sample_rate_index == 0b11 {
        return None;
    }
    let kbps = if version == 0b11 {
        MP3_BITRATES_V1_L3[bitrate_index]
    } else {
        MP3_BITRATES_V2_L3[bitrate_index]
    };
    (kbps > 0).then_some(kbps)
}

fn probe_mp3(data: &[u8]) -> AppResult<Option<f64>> {
    let audio_start = if data.starts_with(b"ID3") {
        let size = data
            .get(6..10)
            .ok_or_else(|| truncated("ID3"))?
            .iter()
            .fold(0usize, |acc, &b| (acc << 7) | usize::from(b & 0x7F));
        10 + size
    } else {
        0
    };

    // Skip padding between the tag and the first frame.
    let frame_start = (audio_start..data.len().saturating_sub(4))
        .find(|&pos| mp3_frame_header(data, pos).is_some())
        .ok_or_else(|| truncated("MP3 (no audio frame)"))?;
    let kbps = mp3_frame_header(data, frame_start).ok_or_else(|| truncated("MP3"))?;

    // Constant bitrate estimate.
    let audio_bytes = (data.len() - frame_start) as f64;
    Ok(Some(audio_bytes * 8.0 / (f64::from(kbps) * 1000.0)))
}

// === Ogg ===

fn probe_ogg(data: &[u8]) -> AppResult<Option<f64>> {
    // First page: 27-byte header, segment table, then the first packet.
    let segments = usize::from(*data.get(26).ok_or_else(|| truncated("Ogg"))?);
    let packet = data
        .get(27 + segments..)
        .ok_or_else(|| truncated("Ogg"))?;

    let (rate, pre_skip) = if packet.starts_with(b"\x01vorbis") {
        (u64::from(le_u32(packet, 12).ok_or_else(|| truncated("Vorbis"))?), 0)
    } else if packet.starts_with(b"OpusHead") {
        let pre_skip = packet
            .get(10..12)
            .map(|b| u64::from(u16::from_le_bytes([b[0], b[1]])))
            .ok_or_else(|| truncated("Opus"))?;
        (48_000, pre_skip)
    } else if packet.starts_with(b"\x7fFLAC") {
        // Ogg FLAC mapping: STREAMINFO follows the 13-byte mapping header.
        return Ok(flac_streaminfo_duration(packet.get(13 + 4..).unwrap_or_default()));
    } else {
        return Ok(None);
    };

    if rate == 0 {
        return Ok(None);
    }

    let last_page = data
        .windows(4)
        .rposition(|w| w == b"OggS")
        .ok_or_else(|| truncated("Ogg"))?;
    let granule = le_u64(data, last_page + 6).ok_or_else(|| truncated("Ogg"))?;
    if granule == u64::MAX {
        return Ok(None);
    }

    Ok(Some(granule.saturating_sub(pre_skip) as f64 / rate as f64))
}

// === FLAC ===

fn flac_streaminfo_duration(streaminfo: &[u8]) -> Option<f64> {
    // 20-bit sample rate, 3-bit channels, 5-bit bps, 36-bit total samples.
    let packed = be_u64(streaminfo, 10)?;
    let sample_rate = (packed >> 44) & 0xF_FFFF;
    let total_samples = packed & 0xF_FFFF_FFFF;
    if sample_rate == 0 || total_samples == 0 {
        return None;
    }
    Some(total_samples as f64 / sample_rate as f64)
}

fn probe_flac(data: &[u8]) -> AppResult<Option<f64>> {
    let block_type = data.get(4).ok_or_else(|| truncated("FLAC"))? & 0x7F;
    if block_type != 0 {
        return Err(truncated("FLAC (first block is not STREAMINFO)"));
    }
    let streaminfo = data.get(8..8 + 34).ok_or_else(|| truncated("FLAC"))?;
    Ok(flac_streaminfo_duration(streaminfo))
}

// === RIFF WAVE ===

fn probe_wav(data: &[u8]) -> AppResult<Option<f64>> {
    let mut pos = 12usize;
    let mut byte_rate = None;
    let mut data_size = None;

    while let (Some(id), Some(size)) = (data.get(pos..pos + 4), le_u32(data, pos + 4)) {
        let body = pos + 8;
        match id {
            b"fmt " => byte_rate = le_u32(data, body + 8),
            b"data" => data_size = Some(size),
            _ => {}
        }
        if byte_rate.is_some() && data_size.is_some() {
            break;
        }
        // Chunks are padded to even length.
        pos = body + size as usize + (size as usize & 1);
    }

    let byte_rate = byte_rate.ok_or_else(|| truncated("WAV (no fmt chunk)"))?;
    Ok(match (data_size, byte_rate) {
        (Some(size), rate) if rate > 0 => Some(f64::from(size) / f64::from(rate)),
        _ => None,
    })
}
