//! Segmentation model registry
//!
//! The removal pipeline works with a fixed set of pretrained salient-object
//! segmentation networks published as ONNX files. Each model carries the
//! input resolution and normalization it was trained with; the processor
//! reads those through [`SegmentationModel::preprocessing_config`].

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Release location of the published ONNX weights
const MODEL_RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Tensor preprocessing parameters for a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input resolution `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after mean subtraction
    pub normalization_std: [f32; 3],
}

/// Pretrained segmentation networks used by the processing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentationModel {
    /// Lightweight U²-Net variant (about 4 MB), used for fast mode
    #[serde(rename = "u2netp")]
    U2netp,
    /// U²-Net trained on human segmentation, used for portraits
    #[serde(rename = "u2net_human_seg")]
    U2netHumanSeg,
    /// IS-Net general purpose model (1024 px input), highest quality
    #[serde(rename = "isnet-general-use")]
    IsnetGeneralUse,
    /// Full U²-Net general purpose model
    #[serde(rename = "u2net")]
    U2net,
}

impl SegmentationModel {
    /// Every model the registry knows about
    pub const ALL: [Self; 4] = [
        Self::U2netp,
        Self::U2netHumanSeg,
        Self::IsnetGeneralUse,
        Self::U2net,
    ];

    /// Identifier used in file names and on the command line
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::U2net => "u2net",
        }
    }

    /// File name of the ONNX weights inside the model directory
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.id())
    }

    /// Download URL for the ONNX weights
    #[must_use]
    pub fn url(self) -> String {
        format!("{}/{}", MODEL_RELEASE_BASE_URL, self.file_name())
    }

    /// Square input resolution of the network
    #[must_use]
    pub fn input_size(self) -> u32 {
        match self {
            Self::IsnetGeneralUse => 1024,
            Self::U2netp | Self::U2netHumanSeg | Self::U2net => 320,
        }
    }

    /// Short human readable description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2netp => "Lightweight general segmentation (fast)",
            Self::U2netHumanSeg => "Human segmentation (portrait)",
            Self::IsnetGeneralUse => "High accuracy general segmentation (best)",
            Self::U2net => "General segmentation (advanced blend)",
        }
    }

    /// Tensor preprocessing parameters for this model
    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        let size = self.input_size();
        let (normalization_mean, normalization_std) = match self {
            Self::IsnetGeneralUse => ([0.5; 3], [1.0; 3]),
            Self::U2netp | Self::U2netHumanSeg | Self::U2net => (IMAGENET_MEAN, IMAGENET_STD),
        };

        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean,
            normalization_std,
        }
    }
}

impl fmt::Display for SegmentationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SegmentationModel {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|model| model.id() == normalized)
            .ok_or_else(|| {
                BgRemovalError::model(format!(
                    "Unknown segmentation model '{}'. Known models: {}",
                    s,
                    Self::ALL.map(Self::id).join(", ")
                ))
            })
    }
}
