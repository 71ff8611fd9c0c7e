//! Best-artifact selection.
//!
//! When a class is carried by several artifacts and the caller did not pin
//! a coordinate, one artifact wins deterministically: having sources beats
//! not having them, then the configured version strategy breaks the tie,
//! then the higher insertion id (later discovery) wins.

use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::store::Artifact;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStrategy {
    /// Higher semantic version wins; a pre-release loses to the release
    /// with the same base version.
    #[default]
    Semver,
    /// Greatest publish timestamp wins, taken from `*.pom.lastUpdated`
    /// markers when present, else the main file's modification time.
    LatestPublished,
    /// Greatest creation time of the main file wins.
    LatestUsed,
}

impl VersionStrategy {
    /// Parse a strategy name, accepting the legacy aliases older
    /// configurations used.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "semver" | "semver-latest" => Ok(Self::Semver),
            "latest-published" | "date-latest" | "modification-time" | "publish-time" => {
                Ok(Self::LatestPublished)
            }
            "latest-used" | "creation-time" | "usage-time" => Ok(Self::LatestUsed),
            other => Err(anyhow::anyhow!("unknown version strategy: {other}")),
        }
    }
}

/// Pick the best artifact among candidates. `None` only for an empty set.
pub fn resolve_best_artifact(
    candidates: &[Artifact],
    strategy: VersionStrategy,
) -> Option<Artifact> {
    candidates
        .iter()
        .max_by(|a, b| compare_artifacts(a, b, strategy))
        .cloned()
}

/// Total order over artifacts for the given strategy; `Greater` means
/// "preferred".
pub fn compare_artifacts(a: &Artifact, b: &Artifact, strategy: VersionStrategy) -> Ordering {
    a.has_source
        .cmp(&b.has_source)
        .then_with(|| match strategy {
            VersionStrategy::Semver => compare_versions(&a.version, &b.version),
            VersionStrategy::LatestPublished => published_at(a).cmp(&published_at(b)),
            VersionStrategy::LatestUsed => created_at(a).cmp(&created_at(b)),
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Lenient semantic version comparison. Numeric dot-segments compare
/// numerically, then a release beats any pre-release of the same base,
/// then pre-release tags compare lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_base, a_pre) = split_prerelease(a);
    let (b_base, b_pre) = split_prerelease(b);

    let a_parts = numeric_parts(a_base);
    let b_parts = numeric_parts(b_base);
    let len = a_parts.len().max(b_parts.len());
    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or(0);
        let y = b_parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

fn split_prerelease(version: &str) -> (&str, Option<&str>) {
    match version.split_once('-') {
        Some((base, pre)) => (base, Some(pre)),
        None => (version, None),
    }
}

fn numeric_parts(base: &str) -> Vec<u64> {
    base.split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Publish instant in millis: the greatest `lastUpdated=<millis>` found in
/// any `*.pom.lastUpdated` marker next to the artifact, else the main
/// file's mtime.
fn published_at(artifact: &Artifact) -> u128 {
    let dir = if artifact.abspath.is_dir() {
        Some(artifact.abspath.clone())
    } else {
        artifact.abspath.parent().map(Path::to_path_buf)
    };

    if let Some(dir) = dir
        && let Ok(entries) = std::fs::read_dir(&dir)
    {
        let mut best: Option<u128> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".pom.lastUpdated") {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(&path)
                && let Some(millis) = max_last_updated(&content)
            {
                best = Some(best.map_or(millis, |b| b.max(millis)));
            }
        }
        if let Some(millis) = best {
            return millis;
        }
    }

    file_time(artifact, |m| m.modified().ok())
}

fn created_at(artifact: &Artifact) -> u128 {
    // created() is unavailable on some filesystems; mtime is the fallback.
    file_time(artifact, |m| m.created().ok().or_else(|| m.modified().ok()))
}

fn file_time(
    artifact: &Artifact,
    pick: impl Fn(&std::fs::Metadata) -> Option<std::time::SystemTime>,
) -> u128 {
    let path = crate::scan::main_archive_path(artifact).unwrap_or_else(|| artifact.abspath.clone());
    std::fs::metadata(path)
        .ok()
        .and_then(|m| pick(&m))
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn max_last_updated(content: &str) -> Option<u128> {
    let mut best: Option<u128> = None;
    for line in content.lines() {
        if let Some(pos) = line.rfind("lastUpdated=") {
            let digits: String = line[pos + "lastUpdated=".len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(millis) = digits.parse::<u128>() {
                best = Some(best.map_or(millis, |b| b.max(millis)));
            }
        }
    }
    best
}
