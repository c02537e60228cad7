//! ffmpeg argument construction.
//!
//! The pipeline runs ffmpeg twice per asset: once to grab a thumbnail and once
//! to produce the DASH package. Both read from and write to URLs, so the same
//! builders serve local paths and the internal object endpoint.

use crate::ladder::Ladder;
use crate::probe::SourceInfo;
use serde::{Deserialize, Serialize};

/// Global x264 options shared by every rung.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// x264 preset (default: medium).
    pub preset: String,
    /// x264 tune (default: film).
    pub tune: String,
    /// Encoder threads, 0 lets ffmpeg decide.
    pub threads: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            preset: "medium".to_string(),
            tune: "film".to_string(),
            threads: 0,
        }
    }
}

/// Where the transcode reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeTargets {
    /// Source input (path or URL).
    pub input: String,
    /// ffmpeg `-progress` sink, e.g. `pipe:1`.
    pub progress: String,
    /// Manifest output; segments are written next to it.
    pub manifest: String,
}

/// Arguments extracting one 1280x720 frame at the one-second mark.
pub fn build_thumbnail_args(input: &str, output: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-nostdin",
        "-i",
        input,
        "-ss",
        "00:00:01",
        "-s",
        "1280x720",
        "-qscale:v",
        "5",
        "-frames:v",
        "1",
        output,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Arguments for the full DASH transcode of `source` into `ladder`.
pub fn build_transcode_args(
    targets: &TranscodeTargets,
    source: &SourceInfo,
    ladder: &Ladder,
    settings: &EncodeSettings,
) -> Vec<String> {
    let gop = source.fps.max(1).to_string();

    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-nostats",
        "-i",
        &targets.input,
        "-preset",
        &settings.preset,
        "-tune",
        &settings.tune,
        "-threads",
        &settings.threads.to_string(),
        "-keyint_min",
        &gop,
        "-g",
        &gop,
        "-sc_threshold",
        "0",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-x264opts",
        "no-scenecut",
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-ac",
        "1",
        "-ar",
        "96000",
        "-seg_duration",
        "1",
        "-use_template",
        "1",
        "-use_timeline",
        "1",
        "-single_file",
        "1",
        "-streaming",
        "0",
        "-utc_timing_url",
        "https://time.akamai.com/?iso",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    args.extend(ladder.encoder_args());
    args.extend(audio_args(source.audio_tracks));

    args.extend([
        "-progress".to_string(),
        targets.progress.clone(),
        "-f".to_string(),
        "dash".to_string(),
        targets.manifest.clone(),
    ]);

    args
}

fn audio_args(tracks: u32) -> Vec<String> {
    let mut args = Vec::new();

    match tracks {
        0 => {}
        1 => args.extend(["-map".to_string(), "0:a".to_string()]),
        n => {
            let inputs: String = (0..n).map(|i| format!("[0:a:{i}]")).collect();
            args.extend([
                "-filter_complex".to_string(),
                format!("{inputs}amerge=inputs={n}[aout]"),
                "-map".to_string(),
                "[aout]".to_string(),
            ]);
        }
    }

    let sets = if tracks > 0 {
        "id=0,streams=v id=1,streams=a"
    } else {
        "id=0,streams=v"
    };
    args.extend(["-adaptation_sets".to_string(), sets.to_string()]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::{select_ladder, QualityTable};
    use std::time::Duration;

    fn source(audio_tracks: u32) -> SourceInfo {
        SourceInfo {
            width: 1280,
            height: 720,
            fps: 60,
            duration: Duration::from_secs(10),
            audio_tracks,
            rotation: 0,
        }
    }

    fn targets() -> TranscodeTargets {
        TranscodeTargets {
            input: "http://127.0.0.1:12786/objects/a/raw".to_string(),
            progress: "pipe:1".to_string(),
            manifest: "http://127.0.0.1:12786/objects/a/manifest.mpd".to_string(),
        }
    }

    fn args_for(audio_tracks: u32) -> Vec<String> {
        let table = QualityTable::parse(&["640x360-30@1", "1280x720-30@5"]).unwrap();
        let src = source(audio_tracks);
        let ladder = select_ladder(src.width, src.height, src.fps, &table);
        build_transcode_args(&targets(), &src, &ladder, &EncodeSettings::default())
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_transcode_args_structure() {
        let args = args_for(1);
        assert_eq!(value_after(&args, "-i"), Some("http://127.0.0.1:12786/objects/a/raw"));
        assert_eq!(value_after(&args, "-preset"), Some("medium"));
        assert_eq!(value_after(&args, "-tune"), Some("film"));
        assert_eq!(value_after(&args, "-threads"), Some("0"));
        assert_eq!(value_after(&args, "-g"), Some("60"));
        assert_eq!(value_after(&args, "-progress"), Some("pipe:1"));
        assert_eq!(value_after(&args, "-f"), Some("dash"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("http://127.0.0.1:12786/objects/a/manifest.mpd")
        );
        assert_eq!(value_after(&args, "-s:v:1"), Some("1280x720"));
        assert_eq!(value_after(&args, "-maxrate:1"), Some("6.0M"));
    }

    #[test]
    fn test_single_audio_track_mapped() {
        let args = args_for(1);
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a"));
        assert!(!args.contains(&"-filter_complex".to_string()));
        assert_eq!(
            value_after(&args, "-adaptation_sets"),
            Some("id=0,streams=v id=1,streams=a")
        );
    }

    #[test]
    fn test_multiple_audio_tracks_merged() {
        let args = args_for(3);
        assert_eq!(
            value_after(&args, "-filter_complex"),
            Some("[0:a:0][0:a:1][0:a:2]amerge=inputs=3[aout]")
        );
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[aout]"));
    }

    #[test]
    fn test_no_audio() {
        let args = args_for(0);
        assert!(!args.iter().any(|a| a == "0:a"));
        assert_eq!(value_after(&args, "-adaptation_sets"), Some("id=0,streams=v"));
    }

    #[test]
    fn test_thumbnail_args() {
        let args = build_thumbnail_args("in.mp4", "thumb.jpg");
        assert_eq!(value_after(&args, "-frames:v"), Some("1"));
        assert_eq!(value_after(&args, "-ss"), Some("00:00:01"));
        assert_eq!(args.last().map(String::as_str), Some("thumb.jpg"));
    }
}
