//! The JSON shape consumed by the optimizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::SourceSpan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedAnalysis {
    pub template: SerializedTemplate,
    /// Local name to block identifier.
    pub blocks: BTreeMap<String, String>,
    pub styles_found: Vec<String>,
    pub elements: BTreeMap<String, SerializedElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTemplate {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

/// Styles are indexes into `stylesFound`. In a correlation, `-1` stands
/// for "none of these".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedElement {
    #[serde(rename = "static")]
    pub static_styles: Vec<i64>,
    pub correlations: Vec<Vec<i64>>,
    pub loc: SourceSpan,
}
