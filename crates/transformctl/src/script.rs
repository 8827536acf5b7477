use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use transform::Message;

/// Ordered messages to replay against a pipeline.
///
/// ```toml
/// [[steps]]
/// op = "set_extent"
/// width = 1920
/// height = 1080
///
/// [[steps]]
/// op = "create_input_surface"
/// width = 1280
/// height = 720
/// format = "yuv420_888"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Message>,
}

impl Script {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read replay script {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Splits the steps into `lanes` caller queues, round-robin, keeping each
    /// lane in script order.
    pub fn lanes(&self, lanes: usize) -> Vec<Vec<Message>> {
        let lanes = lanes.max(1);
        let mut split = vec![Vec::new(); lanes];
        for (index, step) in self.steps.iter().enumerate() {
            split[index % lanes].push(*step);
        }
        split
    }
}
