//! Translation options.
//!
//! ```
//! use watc::Config;
//!
//! let config = Config::from_json(r#"{"debug_names": true, "features": {"bulk_memory": false}}"#).unwrap();
//! assert!(config.debug_names);
//! assert!(!config.features.bulk_memory);
//! assert!(config.features.multi_value);
//! ```

use serde::{Deserialize, Serialize};

/// Options for one translation call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Emit a `name` custom section with module, function and local names.
    pub debug_names: bool,
    pub features: Features,
}

/// Post-MVP proposals accepted by the parser and validator. All default on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Features {
    /// Blocks with parameters and functions or blocks with several results.
    pub multi_value: bool,
    /// `memory.fill/copy/init`, `data.drop`, `table.copy/init`, `elem.drop`
    /// and passive segments.
    pub bulk_memory: bool,
    /// `externref`, `ref.*`, `table.get/set/size/grow/fill`, typed `select`,
    /// multiple tables and declarative segments.
    pub reference_types: bool,
    /// `i32.extend8_s` and friends.
    pub sign_extension: bool,
    /// `i32.trunc_sat_f32_s` and friends.
    pub saturating_float_to_int: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self::all()
    }
}

impl Features {
    pub fn all() -> Self {
        Self {
            multi_value: true,
            bulk_memory: true,
            reference_types: true,
            sign_extension: true,
            saturating_float_to_int: true,
        }
    }

    /// The WebAssembly 1.0 feature set.
    pub fn mvp() -> Self {
        Self {
            multi_value: false,
            bulk_memory: false,
            reference_types: false,
            sign_extension: false,
            saturating_float_to_int: false,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::MultiValue => self.multi_value,
            Feature::BulkMemory => self.bulk_memory,
            Feature::ReferenceTypes => self.reference_types,
            Feature::SignExtension => self.sign_extension,
            Feature::SaturatingFloatToInt => self.saturating_float_to_int,
        }
    }
}

/// A single switchable proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    MultiValue,
    BulkMemory,
    ReferenceTypes,
    SignExtension,
    SaturatingFloatToInt,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::MultiValue => "multi-value",
            Feature::BulkMemory => "bulk-memory",
            Feature::ReferenceTypes => "reference-types",
            Feature::SignExtension => "sign-extension",
            Feature::SaturatingFloatToInt => "saturating-float-to-int",
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
