use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static THUMBNAIL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9-]+)_thumb_(\d+)\.jpg$").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Results,
    Thumbnail,
}

/// Logical address of a stored artifact: `(job_id, kind, index)`.
///
/// Storage adapters decide where the bytes live; the pipeline only ever
/// handles keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub job_id: String,
    pub kind: ArtifactKind,
    pub index: Option<usize>,
}

impl ArtifactKey {
    pub fn results(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            kind: ArtifactKind::Results,
            index: None,
        }
    }

    pub fn thumbnail(job_id: impl Into<String>, index: usize) -> Self {
        Self {
            job_id: job_id.into(),
            kind: ArtifactKind::Thumbnail,
            index: Some(index),
        }
    }

    /// Every key a job can produce when `thumbnail_slots` ratios are sampled.
    pub fn all_for(job_id: &str, thumbnail_slots: usize) -> Vec<Self> {
        std::iter::once(Self::results(job_id))
            .chain((0..thumbnail_slots).map(|i| Self::thumbnail(job_id, i)))
            .collect()
    }

    /// Public file name, e.g. `<job>_results.json` or `<job>_thumb_3.jpg`.
    pub fn file_name(&self) -> String {
        match self.kind {
            ArtifactKind::Results => format!("{}_results.json", self.job_id),
            ArtifactKind::Thumbnail => {
                format!("{}_thumb_{}.jpg", self.job_id, self.index.unwrap_or(0))
            }
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.kind {
            ArtifactKind::Results => "application/json",
            ArtifactKind::Thumbnail => "image/jpeg",
        }
    }

    /// Inverse of [`ArtifactKey::file_name`] for thumbnails.
    pub fn parse_thumbnail(file_name: &str) -> Option<Self> {
        let caps = THUMBNAIL_NAME.captures(file_name)?;
        let index = caps.get(2)?.as_str().parse().ok()?;
        Some(Self::thumbnail(caps.get(1)?.as_str(), index))
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
