//! Encode attributes carried with every work unit.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default container of the split parts when none can be inferred.
pub const DEFAULT_INPUT_FORMAT: &str = "mp4";

/// Codec parameters for one job.
///
/// The parameter bag is opaque to the engine: each entry is rendered as
/// `-{key} {value}` on the transcode command line, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EncodeAttributes {
    /// Container of the source and of the split parts (e.g. "mp4")
    #[serde(default)]
    pub input_format: String,

    /// Container of the encoded parts and the merged artifact (e.g. "mkv")
    pub output_format: String,

    /// Tool parameters, e.g. `{"c:v": "libx265", "crf": "28"}`
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Per-job override of the split segment length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_secs: Option<u32>,
}

impl EncodeAttributes {
    /// Create attributes for the given input and output containers.
    pub fn new(input_format: impl Into<String>, output_format: impl Into<String>) -> Self {
        Self {
            input_format: input_format.into(),
            output_format: output_format.into(),
            params: BTreeMap::new(),
            segment_secs: None,
        }
    }

    /// Add one tool parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Override the split segment length.
    pub fn with_segment_secs(mut self, secs: u32) -> Self {
        self.segment_secs = Some(secs);
        self
    }

    /// Render the parameter bag as tool output arguments.
    pub fn to_output_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() * 2);
        for (key, value) in &self.params {
            let key = key.trim_start_matches('-');
            args.push(format!("-{}", key));
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        args
    }
}
