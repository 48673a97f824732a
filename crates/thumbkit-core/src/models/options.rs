use serde::{Deserialize, Serialize};

/// Per-call normalization options.
///
/// Deserializes from a camelCase JSON object. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOptions {
    /// Cap on the longest side of the display rendition
    #[serde(default)]
    pub max_dimension: Option<u32>,
    /// Format token for the display rendition (e.g. "webp")
    #[serde(default)]
    pub target_format: Option<String>,
}

impl NormalizeOptions {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = Some(max_dimension);
        self
    }

    pub fn with_target_format(mut self, target_format: impl Into<String>) -> Self {
        self.target_format = Some(target_format.into());
        self
    }

    /// Downscale cap, with zero meaning no cap
    pub fn effective_max_dimension(&self) -> Option<u32> {
        self.max_dimension.filter(|max| *max > 0)
    }
}
