//! FFprobe invocation and output parsing.

use super::SourceInfo;
use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<i32>,
}

/// Arguments for an ffprobe run against `input`.
pub fn probe_args(input: &str) -> Vec<String> {
    [
        "-v",
        "error",
        "-show_entries",
        "format=duration:stream=width,height,r_frame_rate,index,codec_type:stream_side_data=rotation",
        "-sexagesimal",
        "-of",
        "json",
        input,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Parse the JSON ffprobe prints for [`probe_args`].
pub fn parse_probe_output(json: &[u8]) -> Result<SourceInfo> {
    let output: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::parse_error("ffprobe", e.to_string()))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(Error::NoVideoStream)?;

    let audio_tracks = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .count() as u32;

    let (mut width, mut height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::parse_error("ffprobe", "video stream has no dimensions")),
    };

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| Error::parse_error("ffprobe", "missing or invalid r_frame_rate"))?;

    let duration = output
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| Error::parse_error("ffprobe", "missing format duration"))
        .and_then(|d| parse_sexagesimal(&d))?;

    let rotation = video
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .unwrap_or(0);

    if matches!(rotation.rem_euclid(360), 90 | 270) {
        std::mem::swap(&mut width, &mut height);
    }

    Ok(SourceInfo {
        width,
        height,
        fps,
        duration,
        audio_tracks,
        rotation,
    })
}

/// Parse an ffprobe `-sexagesimal` duration (`H:MM:SS.micros`).
///
/// # Examples
///
/// ```
/// use cliphost_av::parse_sexagesimal;
/// use std::time::Duration;
///
/// assert_eq!(parse_sexagesimal("0:01:30.500000").unwrap(), Duration::from_millis(90_500));
/// ```
pub fn parse_sexagesimal(value: &str) -> Result<Duration> {
    let invalid = || Error::parse_error("ffprobe", format!("invalid duration: {value:?}"));

    let mut parts = value.trim().split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let hours: u64 = h.trim().parse().map_err(|_| invalid())?;
    let minutes: u64 = m.trim().parse().map_err(|_| invalid())?;
    let seconds: f64 = s.trim().parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }

    Ok(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

/// `30000/1001` -> 30, `25/1` -> 25, `24` -> 24.
fn parse_frame_rate(rate: &str) -> Option<u32> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    (value.is_finite() && value > 0.0).then(|| value.round() as u32)
}
