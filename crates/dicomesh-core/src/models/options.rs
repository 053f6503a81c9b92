use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DicomeshError, Result};

/// Tissue preset passed to the conversion tool's `--type` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TissueType {
    #[default]
    SoftTissue,
    Bone,
    Skin,
    Fat,
}

impl TissueType {
    pub const ALL: [TissueType; 4] = [
        TissueType::SoftTissue,
        TissueType::Bone,
        TissueType::Skin,
        TissueType::Fat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TissueType::SoftTissue => "soft_tissue",
            TissueType::Bone => "bone",
            TissueType::Skin => "skin",
            TissueType::Fat => "fat",
        }
    }
}

impl fmt::Display for TissueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TissueType {
    type Err = DicomeshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "soft_tissue" | "soft" => Ok(TissueType::SoftTissue),
            "bone" => Ok(TissueType::Bone),
            "skin" => Ok(TissueType::Skin),
            "fat" => Ok(TissueType::Fat),
            _ => Err(DicomeshError::InvalidOption {
                key: "tissue_type".to_string(),
                reason: format!("Unknown tissue type: {}. Use soft_tissue, bone, skin, or fat", s),
            }),
        }
    }
}

/// User-selected conversion flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub tissue_type: TissueType,

    /// Keep only the largest connected component
    pub keep_largest: bool,

    pub smooth_iterations: u32,

    /// Mesh reduction factor, 0 < f <= 1
    pub reduce_factor: f64,

    /// Small part removal threshold, 0 <= f <= 1
    pub clean_small_factor: f64,

    pub anisotropic_volume: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            tissue_type: TissueType::SoftTissue,
            keep_largest: true,
            smooth_iterations: 25,
            reduce_factor: 0.9,
            clean_small_factor: 0.05,
            anisotropic_volume: false,
        }
    }
}

impl ConversionOptions {
    /// Check value ranges before the options reach the tool
    pub fn validate(&self) -> Result<()> {
        if !self.reduce_factor.is_finite() || self.reduce_factor <= 0.0 || self.reduce_factor > 1.0
        {
            return Err(DicomeshError::InvalidOption {
                key: "reduce_factor".to_string(),
                reason: format!("{} is outside (0, 1]", self.reduce_factor),
            });
        }

        if !self.clean_small_factor.is_finite()
            || !(0.0..=1.0).contains(&self.clean_small_factor)
        {
            return Err(DicomeshError::InvalidOption {
                key: "clean_small_factor".to_string(),
                reason: format!("{} is outside [0, 1]", self.clean_small_factor),
            });
        }

        Ok(())
    }

    /// Render the option flags in their fixed order:
    /// `--type`, `--smooth`, `--reduce`, `--clean-small`, then the optional
    /// `--enable largest` and `--anisotropic` switches.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--type".to_string(),
            self.tissue_type.to_string(),
            "--smooth".to_string(),
            self.smooth_iterations.to_string(),
            "--reduce".to_string(),
            format!("{:.3}", self.reduce_factor),
            "--clean-small".to_string(),
            format!("{:.3}", self.clean_small_factor),
        ];

        if self.keep_largest {
            args.push("--enable".to_string());
            args.push("largest".to_string());
        }

        if self.anisotropic_volume {
            args.push("--anisotropic".to_string());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_args() {
        let args = ConversionOptions::default().to_args();
        assert_eq!(
            args,
            vec![
                "--type",
                "soft_tissue",
                "--smooth",
                "25",
                "--reduce",
                "0.900",
                "--clean-small",
                "0.050",
                "--enable",
                "largest",
            ]
        );
    }

    #[test]
    fn test_optional_flags() {
        let options = ConversionOptions {
            tissue_type: TissueType::Bone,
            keep_largest: false,
            anisotropic_volume: true,
            ..Default::default()
        };
        let args = options.to_args();
        assert!(!args.contains(&"largest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--anisotropic"));
        assert_eq!(args[1], "bone");
    }

    #[test]
    fn test_validate_ranges() {
        assert!(ConversionOptions::default().validate().is_ok());

        let zero_reduce = ConversionOptions { reduce_factor: 0.0, ..Default::default() };
        assert!(zero_reduce.validate().is_err());

        let full_reduce = ConversionOptions { reduce_factor: 1.0, ..Default::default() };
        assert!(full_reduce.validate().is_ok());

        let bad_clean = ConversionOptions { clean_small_factor: 1.5, ..Default::default() };
        assert!(bad_clean.validate().is_err());

        let nan = ConversionOptions { reduce_factor: f64::NAN, ..Default::default() };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_parse_tissue_type() {
        assert_eq!("soft-tissue".parse::<TissueType>().unwrap(), TissueType::SoftTissue);
        assert_eq!("BONE".parse::<TissueType>().unwrap(), TissueType::Bone);
        assert!("cartilage".parse::<TissueType>().is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: ConversionOptions =
            serde_json::from_str(r#"{"tissue_type": "skin"}"#).unwrap();
        assert_eq!(options.tissue_type, TissueType::Skin);
        assert_eq!(options.smooth_iterations, 25);
        assert!(options.keep_largest);
    }

    fn arb_options() -> impl Strategy<Value = ConversionOptions> {
        (
            prop::sample::select(TissueType::ALL.to_vec()),
            any::<bool>(),
            0u32..200,
            0.001f64..=1.0,
            0.0f64..=1.0,
            any::<bool>(),
        )
            .prop_map(|(tissue_type, keep_largest, smooth, reduce, clean, aniso)| {
                ConversionOptions {
                    tissue_type,
                    keep_largest,
                    smooth_iterations: smooth,
                    reduce_factor: reduce,
                    clean_small_factor: clean,
                    anisotropic_volume: aniso,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_args_are_deterministic(options in arb_options()) {
            prop_assert_eq!(options.to_args(), options.to_args());
            prop_assert_eq!(options.to_args(), options.clone().to_args());
        }

        #[test]
        fn prop_flag_order_is_fixed(options in arb_options()) {
            let args = options.to_args();
            prop_assert_eq!(&args[0], "--type");
            prop_assert_eq!(&args[2], "--smooth");
            prop_assert_eq!(&args[4], "--reduce");
            prop_assert_eq!(&args[6], "--clean-small");
            prop_assert_eq!(args[5].split('.').nth(1).map(str::len), Some(3));
            let expected_len = 8
                + if options.keep_largest { 2 } else { 0 }
                + if options.anisotropic_volume { 1 } else { 0 };
            prop_assert_eq!(args.len(), expected_len);
            prop_assert!(options.validate().is_ok());
        }
    }
}
