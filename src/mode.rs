//! Processing modes and their model/matting parameter table

use crate::error::{BgRemovalError, Result};
use crate::models::SegmentationModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alpha matting parameters on the 0-255 mask scale
///
/// Thresholds may exceed 255; a foreground threshold above the mask range
/// simply leaves no confident-foreground seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MattingParams {
    /// Mask values strictly above this are confident foreground
    pub foreground_threshold: u16,
    /// Mask values strictly below this are confident background
    pub background_threshold: u16,
    /// Side length of the square erosion applied to both confident regions
    pub erode_size: u32,
}

/// One segmentation pass: which model to run and how to matte its mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPass {
    pub model: SegmentationModel,
    pub matting: MattingParams,
}

/// Quality/speed tradeoff selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Lightweight model, quickest turnaround
    Fast,
    /// Human segmentation model
    Portrait,
    /// High accuracy general model
    #[default]
    Best,
    /// Two models blended by maximum alpha
    Advanced,
}

pub(crate) const BEST_MATTING: MattingParams = MattingParams {
    foreground_threshold: 270,
    background_threshold: 20,
    erode_size: 12,
};

const FAST_PASSES: [ModelPass; 1] = [ModelPass {
    model: SegmentationModel::U2netp,
    matting: MattingParams {
        foreground_threshold: 240,
        background_threshold: 10,
        erode_size: 10,
    },
}];

const PORTRAIT_PASSES: [ModelPass; 1] = [ModelPass {
    model: SegmentationModel::U2netHumanSeg,
    matting: MattingParams {
        foreground_threshold: 250,
        background_threshold: 5,
        erode_size: 15,
    },
}];

const BEST_PASSES: [ModelPass; 1] = [ModelPass {
    model: SegmentationModel::IsnetGeneralUse,
    matting: BEST_MATTING,
}];

/// Single pass used by the feathered cutout
pub const FEATHER_PASS: ModelPass = ModelPass {
    model: SegmentationModel::IsnetGeneralUse,
    matting: BEST_MATTING,
};

/// Default Gaussian sigma for the feathered cutout
pub const DEFAULT_FEATHER_SIGMA: f32 = 2.0;

const ADVANCED_PASSES: [ModelPass; 2] = [
    ModelPass {
        model: SegmentationModel::IsnetGeneralUse,
        matting: BEST_MATTING,
    },
    ModelPass {
        model: SegmentationModel::U2net,
        matting: MattingParams {
            foreground_threshold: 260,
            background_threshold: 15,
            erode_size: 10,
        },
    },
];

impl ProcessingMode {
    pub const ALL: [Self; 4] = [Self::Best, Self::Portrait, Self::Fast, Self::Advanced];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Portrait => "portrait",
            Self::Best => "best",
            Self::Advanced => "advanced",
        }
    }

    /// Model passes run for this mode, in blend order
    #[must_use]
    pub fn passes(self) -> &'static [ModelPass] {
        match self {
            Self::Fast => &FAST_PASSES,
            Self::Portrait => &PORTRAIT_PASSES,
            Self::Best => &BEST_PASSES,
            Self::Advanced => &ADVANCED_PASSES,
        }
    }

    /// Distinct models this mode needs on disk
    #[must_use]
    pub fn models(self) -> Vec<SegmentationModel> {
        let mut models: Vec<_> = self.passes().iter().map(|pass| pass.model).collect();
        models.dedup();
        models
    }

    /// Whether the input is upscaled and sharpened before segmentation
    #[must_use]
    pub fn enhances_input(self) -> bool {
        !matches!(self, Self::Advanced)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "portrait" => Ok(Self::Portrait),
            "best" => Ok(Self::Best),
            "advanced" => Ok(Self::Advanced),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown processing mode '{}'. Valid modes: {}",
                other,
                Self::ALL.map(Self::as_str).join(", ")
            ))),
        }
    }
}
