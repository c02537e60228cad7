//! Quality-ladder selection.
//!
//! A [`QualityTable`] is the configured set of rungs (`WxH-FPS@MBPS`), all in
//! landscape 16:9. For each source, [`select_ladder`] keeps every rung that
//! does not exceed the source's resolution or frame rate and re-orients the
//! result for vertical sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame rates below this are matched as if they were this value.
pub const MIN_LADDER_FPS: u32 = 30;

/// Maximum deviation from 16:9 accepted for a configured rung.
pub const ASPECT_TOLERANCE: f64 = 0.01;

const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;

/// Configuration errors in the quality table. These are fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LadderError {
    #[error("no quality presets defined")]
    NoPresetsDefined,

    #[error("quality preset {0} is not 16:9")]
    InvalidAspectRatio(QualityPreset),

    #[error("invalid quality preset {value:?}: expected WIDTHxHEIGHT-FPS@MBPS")]
    InvalidPreset { value: String },
}

/// One configured rung: resolution, frame rate and video bitrate in Mbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualityPreset {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate: f32,
}

impl QualityPreset {
    fn aspect_deviation(&self) -> f64 {
        (f64::from(self.width) / f64::from(self.height) - LANDSCAPE_RATIO).abs()
    }
}

impl FromStr for QualityPreset {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LadderError::InvalidPreset {
            value: s.to_string(),
        };

        let (shape, bitrate) = s.trim().split_once('@').ok_or_else(invalid)?;
        let (resolution, framerate) = shape.split_once('-').ok_or_else(invalid)?;
        let (width, height) = resolution.split_once('x').ok_or_else(invalid)?;

        let preset = QualityPreset {
            width: width.parse().map_err(|_| invalid())?,
            height: height.parse().map_err(|_| invalid())?,
            framerate: framerate.parse().map_err(|_| invalid())?,
            bitrate: bitrate.parse().map_err(|_| invalid())?,
        };

        if preset.width == 0
            || preset.height == 0
            || preset.framerate == 0
            || !(preset.bitrate.is_finite() && preset.bitrate > 0.0)
        {
            return Err(invalid());
        }

        Ok(preset)
    }
}

impl TryFrom<String> for QualityPreset {
    type Error = LadderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualityPreset> for String {
    fn from(preset: QualityPreset) -> Self {
        preset.to_string()
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}-{}@{}",
            self.width, self.height, self.framerate, self.bitrate
        )
    }
}

/// Validated, bitrate-ordered set of configured rungs.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityTable {
    presets: Vec<QualityPreset>,
}

impl QualityTable {
    /// Validate a configured table.
    ///
    /// # Errors
    ///
    /// [`LadderError::NoPresetsDefined`] for an empty table and
    /// [`LadderError::InvalidAspectRatio`] for the first rung that is not
    /// 16:9 within [`ASPECT_TOLERANCE`].
    pub fn new(mut presets: Vec<QualityPreset>) -> Result<Self, LadderError> {
        if presets.is_empty() {
            return Err(LadderError::NoPresetsDefined);
        }

        if let Some(bad) = presets
            .iter()
            .find(|p| p.aspect_deviation() > ASPECT_TOLERANCE)
        {
            return Err(LadderError::InvalidAspectRatio(*bad));
        }

        presets.sort_by(|a, b| a.bitrate.total_cmp(&b.bitrate));
        Ok(Self { presets })
    }

    /// Parse and validate preset strings.
    pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self, LadderError> {
        let presets = values
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<Result<Vec<QualityPreset>, _>>()?;
        Self::new(presets)
    }

    /// Presets ordered by ascending bitrate.
    pub fn presets(&self) -> &[QualityPreset] {
        &self.presets
    }

    /// The lowest-bitrate preset.
    pub fn lowest(&self) -> QualityPreset {
        // Non-empty by construction.
        self.presets[0]
    }
}

/// Display aspect of the produced representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AspectRatio {
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// One selected output representation. `index` 0 is the lowest bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rung {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate: f32,
}

impl Rung {
    /// Encoder arguments for this rung's output stream.
    fn encoder_args(&self) -> Vec<String> {
        let i = self.index;
        vec![
            "-map".to_string(),
            "v:0".to_string(),
            format!("-s:v:{i}"),
            format!("{}x{}", self.width, self.height),
            format!("-b:v:{i}"),
            bit_string(self.bitrate),
            format!("-maxrate:{i}"),
            bit_string(self.bitrate * 1.2),
            format!("-bufsize:{i}"),
            bit_string(self.bitrate * 2.0),
            format!("-r:v:{i}"),
            self.framerate.to_string(),
        ]
    }
}

/// The ordered set of rungs selected for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ladder {
    aspect: AspectRatio,
    rungs: Vec<Rung>,
}

impl Ladder {
    pub fn aspect(&self) -> AspectRatio {
        self.aspect
    }

    /// Rungs ordered by ascending bitrate. Never empty.
    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    /// Frame rate of output stream 0, the stream ffmpeg's frame counter follows.
    pub fn primary_framerate(&self) -> u32 {
        self.rungs[0].framerate
    }

    /// `-aspect` plus one argument group per rung.
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args = vec!["-aspect".to_string(), self.aspect.as_str().to_string()];
        for rung in &self.rungs {
            args.extend(rung.encoder_args());
        }
        args
    }
}

/// Select the quality ladder for a source of `width`x`height` at `fps`.
///
/// Dimensions must already be in displayed orientation. Vertical sources are
/// matched against the table as landscape and the selected rungs are turned
/// back to portrait. When no rung fits, the lowest-bitrate rung is used.
pub fn select_ladder(width: u32, height: u32, fps: u32, table: &QualityTable) -> Ladder {
    let fps = fps.max(MIN_LADDER_FPS);
    let vertical = height > width;
    let (width, height) = if vertical {
        (height, width)
    } else {
        (width, height)
    };

    let mut selected: Vec<QualityPreset> = table
        .presets()
        .iter()
        .filter(|p| p.width <= width && p.height <= height && p.framerate <= fps)
        .copied()
        .collect();

    if selected.is_empty() {
        selected.push(table.lowest());
    }

    if vertical {
        for preset in &mut selected {
            std::mem::swap(&mut preset.width, &mut preset.height);
        }
    }

    selected.sort_by(|a, b| a.bitrate.total_cmp(&b.bitrate));

    let rungs = selected
        .into_iter()
        .enumerate()
        .map(|(index, p)| Rung {
            index,
            width: p.width,
            height: p.height,
            framerate: p.framerate,
            bitrate: p.bitrate,
        })
        .collect();

    Ladder {
        aspect: if vertical {
            AspectRatio::Portrait
        } else {
            AspectRatio::Landscape
        },
        rungs,
    }
}

fn bit_string(mbps: f32) -> String {
    format!("{mbps:.1}M")
}
