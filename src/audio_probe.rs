use std::io::Cursor;
use std::path::Path;
use symphonia::core::{
    codecs::CODEC_TYPE_NULL, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("No audio tracks found")]
    NoAudioTracks,
    #[error("Track does not declare its length")]
    UnknownDuration,
}

/// Read the duration in seconds of encoded audio from its container headers
///
/// Nothing is decoded; formats that do not declare a frame count (some
/// VBR mp3 without a Xing header) yield `UnknownDuration`.
pub fn probe_duration(data: &[u8], file_name: &str) -> Result<f64, ProbeError> {
    let cursor = Cursor::new(data.to_vec());
    let media_source = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = Path::new(file_name).extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        media_source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(ProbeError::NoAudioTracks)?;

    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(n_frames), Some(sample_rate)) if sample_rate > 0 => {
            Ok(n_frames as f64 / sample_rate as f64)
        }
        _ => Err(ProbeError::UnknownDuration),
    }
}
