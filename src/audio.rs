//! In-memory WAV splicing for the dialogue synthesizer: header-aware
//! concatenation of per-turn clips plus generated silence gaps.

use anyhow::{anyhow, Result};

/// Sample rate of the fallback silent artifact (matches the speech backend).
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

pub struct WavInfo {
    pub fmt: Vec<u8>,
    pub data_offset: usize,
    pub data_len: usize,
}

/// Locates the fmt and data chunks of a RIFF/WAVE byte buffer.
pub fn scan_wav(bytes: &[u8]) -> Result<WavInfo> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(anyhow!("not a RIFF/WAVE buffer"));
    }

    let mut pos = 12;
    let mut fmt: Option<Vec<u8>> = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
                as usize;
        pos += 8;

        if pos + chunk_size > bytes.len() {
            return Err(anyhow!("truncated chunk in WAV buffer"));
        }

        if chunk_id == b"fmt " {
            fmt = Some(bytes[pos..pos + chunk_size].to_vec());
        } else if chunk_id == b"data" {
            return Ok(WavInfo {
                fmt: fmt.ok_or_else(|| anyhow!("data chunk before fmt chunk"))?,
                data_offset: pos,
                data_len: chunk_size,
            });
        }

        // RIFF chunks are word-aligned: odd sizes carry a pad byte.
        pos += chunk_size + (chunk_size & 1);
    }

    Err(anyhow!("missing data chunk in WAV buffer"))
}

/// Concatenates WAV clips in order into a single artifact.
/// All clips must share the same fmt chunk (sample rate, channels, depth).
pub fn concat_wavs(clips: &[Vec<u8>]) -> Result<Vec<u8>> {
    let first = clips
        .first()
        .ok_or_else(|| anyhow!("no clips to concatenate"))?;
    let base = scan_wav(first)?;

    let mut infos = Vec::with_capacity(clips.len());
    let mut total_data: u32 = base.data_len as u32;
    infos.push(base);

    for clip in &clips[1..] {
        let info = scan_wav(clip)?;
        if info.fmt != infos[0].fmt {
            return Err(anyhow!(
                "WAV format mismatch: all clips must share sample rate and channels"
            ));
        }
        total_data += info.data_len as u32;
        infos.push(info);
    }

    let fmt = infos[0].fmt.clone();
    let mut out = Vec::with_capacity(44 + total_data as usize);
    write_header(&mut out, &fmt, total_data);
    for (clip, info) in clips.iter().zip(&infos) {
        out.extend_from_slice(&clip[info.data_offset..info.data_offset + info.data_len]);
    }

    Ok(out)
}

/// Builds a silence clip whose fmt chunk matches `fmt`, so it can be spliced
/// between real clips. Duration is rounded down to a whole frame.
pub fn silence_matching(fmt: &[u8], duration_ms: u32) -> Result<Vec<u8>> {
    if fmt.len() < 16 {
        return Err(anyhow!("fmt chunk too short to derive byte rate"));
    }
    let byte_rate = u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]);
    let block_align = u16::from_le_bytes([fmt[12], fmt[13]]).max(1) as usize;

    let mut data_len = (byte_rate as u64 * duration_ms as u64 / 1000) as usize;
    data_len -= data_len % block_align;

    let mut out = Vec::with_capacity(44 + data_len);
    write_header(&mut out, fmt, data_len as u32);
    out.resize(out.len() + data_len, 0);
    Ok(out)
}

/// Standalone silent artifact (16-bit mono PCM at the default rate). Used
/// when a transcript produces no synthesizable turns at all.
pub fn silence_default(duration_ms: u32) -> Vec<u8> {
    let fmt = pcm_fmt_chunk(DEFAULT_SAMPLE_RATE, 1, 16);
    // fmt is well formed by construction
    silence_matching(&fmt, duration_ms).unwrap_or_default()
}

pub fn pcm_fmt_chunk(sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&byte_rate.to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());
    fmt
}

fn write_header(out: &mut Vec<u8>, fmt: &[u8], data_len: u32) {
    out.extend_from_slice(b"RIFF");
    // 4 (WAVE) + 8 + fmt + 8 + data
    let riff_size = 4 + 8 + fmt.len() as u32 + 8 + data_len;
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    out.extend_from_slice(fmt);
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
}

#[cfg(test)]
pub(crate) fn test_wav(data_len: u32, sample_rate: u32) -> Vec<u8> {
    let fmt = pcm_fmt_chunk(sample_rate, 1, 16);
    let mut out = Vec::new();
    write_header(&mut out, &fmt, data_len);
    out.resize(out.len() + data_len as usize, 0x55);
    out
}
