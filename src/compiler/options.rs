//! Per-capability options forwarded to the compiler module.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    /// Include source positions in the tree.
    pub position: bool,
}

/// Source map emission for transform output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcemapMode {
    #[default]
    #[serde(rename = "false")]
    Off,
    Inline,
    External,
    Both,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    pub internal_url: Option<String>,
    pub filename: Option<String>,
    pub normalized_filename: Option<String>,
    pub sourcemap: SourcemapMode,
    pub global_args: Option<String>,
    pub compact: bool,
    pub result_scoped_slot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    pub filename: Option<String>,
    pub normalized_filename: Option<String>,
}
