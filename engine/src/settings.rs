//! Per-namespace application preferences.
//!
//! Settings are local only: they are stored alongside the collections but
//! never enqueued or pulled.

use serde::{Deserialize, Serialize};

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub currency: String,
    pub theme: String,
    pub language: String,
    pub distance_unit: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: "zł".to_string(),
            theme: "system".to_string(),
            language: "pl".to_string(),
            distance_unit: "km".to_string(),
        }
    }
}
