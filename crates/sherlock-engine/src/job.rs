//! Sherlock job model: input sanitizing, export format and the argv handed to
//! the container.

use std::path::Path;

use crate::engine::{ContainerSpec, VolumeBind};
use crate::errors::JobError;

/// Mount point of the shared data directory inside the container.
pub const CONTAINER_DATA_DIR: &str = "/data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Map the raw form value to a format.
    ///
    /// A missing field means csv. `"csv"` is the only value that selects csv;
    /// every other value, including typos and an empty string, falls back to
    /// json.
    pub fn from_form(value: Option<&str>) -> Self {
        match value {
            None | Some("csv") => ExportFormat::Csv,
            Some("json") => ExportFormat::Json,
            Some(other) => {
                log::debug!("Unrecognized export format {:?}, falling back to json", other);
                ExportFormat::Json
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "--csv",
            ExportFormat::Json => "--json",
        }
    }
}

/// Replace path separators with `_` and trim surrounding whitespace.
pub fn sanitize_username(raw: &str) -> String {
    raw.replace(['/', '\\'], "_").trim().to_string()
}

/// A validated sherlock lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SherlockJob {
    username: String,
    format: ExportFormat,
}

impl SherlockJob {
    pub fn new(raw_username: &str, format: ExportFormat) -> Result<Self, JobError> {
        let trimmed = raw_username.trim();
        if trimmed.is_empty() {
            return Err(JobError::EmptyUsername);
        }

        Ok(Self {
            username: sanitize_username(trimmed),
            format,
        })
    }

    /// The sanitized username.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Path of the export file as seen from inside the container.
    pub fn output_path(&self) -> String {
        format!(
            "{}/{}.{}",
            CONTAINER_DATA_DIR,
            self.username,
            self.format.extension()
        )
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            self.username.clone(),
            "-o".to_string(),
            self.output_path(),
            self.format.flag().to_string(),
        ]
    }

    /// Space-joined argv for logs. Never executed through a shell.
    pub fn command_line(&self) -> String {
        self.args().join(" ")
    }

    pub fn container_spec(&self, image: &str, data_dir: &Path) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            args: self.args(),
            volumes: vec![VolumeBind::read_write(data_dir, CONTAINER_DATA_DIR)],
            remove: true,
            tty: false,
            stdin_open: false,
        }
    }
}
