//! Output formatting for multiple formats
//!
//! This module provides formatters for different output formats including JSON, YAML,
//! and human-readable text. Each formatter implements consistent styling and structure.
//!
//! # Example
//!
//! ```ignore
//! use podkiln::cli::output::{ImageReport, OutputFormat, OutputFormatter};
//!
//! let report = ImageReport::from(&handle);
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_image(&report)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::image::ImageHandle;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Serializable view of a published image, as the CLI reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    pub image_id: String,
    pub manifest_digest: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub working_dir: String,
    pub env: Vec<String>,
    pub layers: Vec<LayerReport>,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerReport {
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub created_by: String,
    pub empty_layer: bool,
}

impl From<&ImageHandle> for ImageReport {
    fn from(handle: &ImageHandle) -> Self {
        Self {
            image_id: handle.image_id.to_string(),
            manifest_digest: handle.manifest_digest.to_string(),
            tag: handle.tag.clone(),
            created: handle.config.created.clone(),
            working_dir: handle.config.config.working_dir.clone(),
            env: handle.config.config.env.clone(),
            layers: handle
                .layers
                .iter()
                .map(|layer| LayerReport {
                    digest: layer.digest.clone(),
                    size: layer.size,
                })
                .collect(),
            stages: handle
                .config
                .history
                .iter()
                .map(|entry| StageReport {
                    created_by: entry.created_by.clone().unwrap_or_default(),
                    empty_layer: entry.empty_layer,
                })
                .collect(),
        }
    }
}

/// Output formatter for build and inspect reports
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an image report according to the configured format
    pub fn format_image(&self, report: &ImageReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_json(report),
            OutputFormat::Yaml => self.format_yaml(report),
            OutputFormat::Human => Ok(self.format_human(report)),
        }
    }

    fn format_json(&self, report: &ImageReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("Failed to serialize image report to JSON")
    }

    fn format_yaml(&self, report: &ImageReport) -> Result<String> {
        serde_yaml::to_string(report).context("Failed to serialize image report to YAML")
    }

    fn format_human(&self, report: &ImageReport) -> String {
        let mut output = String::new();

        output.push_str("\u{2713} Pod Image\n");
        output.push_str(&"\u{2501}".repeat(42));
        output.push_str("\n\n");

        output.push_str(&format!("Image ID:   {}\n", report.image_id));
        output.push_str(&format!("Manifest:   {}\n", report.manifest_digest));
        let tag = if report.tag.is_empty() {
            "(none)"
        } else {
            &report.tag
        };
        output.push_str(&format!("Tag:        {}\n", tag));
        if let Some(created) = &report.created {
            output.push_str(&format!("Created:    {}\n", created));
        }
        output.push_str(&format!("Workdir:    {}\n\n", report.working_dir));

        output.push_str("Environment:\n");
        if report.env.is_empty() {
            output.push_str("\u{2514}\u{2500} (none)\n");
        } else {
            for (i, entry) in report.env.iter().enumerate() {
                let connector = if i == report.env.len() - 1 {
                    "\u{2514}"
                } else {
                    "\u{251C}"
                };
                output.push_str(&format!("{}\u{2500} {}\n", connector, entry));
            }
        }
        output.push('\n');

        let total: u64 = report.layers.iter().map(|l| l.size).sum();
        output.push_str(&format!(
            "Layers ({}, {} total):\n",
            report.layers.len(),
            human_size(total)
        ));
        if report.layers.is_empty() {
            output.push_str("\u{2514}\u{2500} (none)\n");
        } else {
            for (i, layer) in report.layers.iter().enumerate() {
                let connector = if i == report.layers.len() - 1 {
                    "\u{2514}"
                } else {
                    "\u{251C}"
                };
                output.push_str(&format!(
                    "{}\u{2500} {} ({})\n",
                    connector,
                    short_digest(&layer.digest),
                    human_size(layer.size)
                ));
            }
        }
        output.push('\n');

        output.push_str("Stages:\n");
        for (i, stage) in report.stages.iter().enumerate() {
            let connector = if i == report.stages.len() - 1 {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            let marker = if stage.empty_layer { " (no layer)" } else { "" };
            output.push_str(&format!(
                "{}\u{2500} {}{}\n",
                connector, stage.created_by, marker
            ));
        }

        output
    }
}

/// Abbreviate an `algorithm:hash` digest for human output.
fn short_digest(digest: &str) -> String {
    match digest.split_once(':') {
        Some((algorithm, hash)) if hash.len() > 12 => {
            format!("{}:{}", algorithm, &hash[..12])
        }
        _ => digest.to_string(),
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
