//! Repository scanning.
//!
//! Translates the two on-disk cache layouts into a uniform artifact list:
//!
//! - Maven: `root/<group-as-path>/<artifactId>/<version>/` containing
//!   `<artifactId>-<version>.pom` (and usually the jars next to it).
//! - Gradle: `root/<groupId>/<artifactId>/<version>/<hash>/<files>`, where
//!   `groupId` is a literal dotted directory name and one version can be
//!   spread over several hash directories.
//!
//! Unreadable directories and files are skipped; a scan never aborts as a
//! whole. Include-prefix pruning happens at directory level here and again
//! at symbol level in the indexer.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::Artifact;

/// Scan a Maven-layout repository root.
///
/// A leaf directory holding `<artifactId>-<version>.pom` identifies an
/// artifact: the leaf name is the version, its parent the artifactId, and
/// the dotted path from the root to the grandparent the groupId.
pub fn scan_maven(root: &Path, prefixes: &[String]) -> Vec<Artifact> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false);

    if !prefixes.is_empty() {
        let root = root.to_path_buf();
        let prefixes = prefixes.to_vec();
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir {
                return true;
            }
            match dotted_relative(&root, entry.path()) {
                Some(dotted) if !dotted.is_empty() => {
                    prefixes.iter().any(|p| prefix_compatible(&dotted, p))
                }
                _ => true,
            }
        });
    }

    let mut artifacts = Vec::new();
    for result in builder.build() {
        let Ok(entry) = result else { continue };
        let path = entry.path();
        if path.extension().is_none_or(|e| e != "pom") {
            continue;
        }
        if let Some(artifact) = maven_artifact_from_pom(root, path) {
            artifacts.push(artifact);
        }
    }
    debug!(root = %root.display(), count = artifacts.len(), "maven scan complete");
    artifacts
}

fn maven_artifact_from_pom(root: &Path, pom: &Path) -> Option<Artifact> {
    let version_dir = pom.parent()?;
    let version = version_dir.file_name()?.to_str()?.to_string();
    let artifact_dir = version_dir.parent()?;
    let artifact_id = artifact_dir.file_name()?.to_str()?.to_string();
    let group_dir = artifact_dir.parent()?;
    let group_id = dotted_relative(root, group_dir).filter(|g| !g.is_empty())?;

    // The pom must actually belong to this directory triple; stray poms
    // (e.g. parent poms dropped into odd places) are ignored.
    let expected = format!("{artifact_id}-{version}.pom");
    if pom.file_name()?.to_str()? != expected {
        return None;
    }

    let has_source = version_dir
        .join(format!("{artifact_id}-{version}-sources.jar"))
        .is_file();

    Some(Artifact {
        id: 0,
        group_id,
        artifact_id,
        version,
        abspath: version_dir.to_path_buf(),
        has_source,
        is_indexed: false,
    })
}

/// Scan a Gradle modules cache root.
///
/// Files for one version are aggregated across its hash directories: the
/// single jar that is neither `-sources.jar` nor `-javadoc.jar` becomes
/// the main archive, and any `-sources.jar` sets `hasSource`.
pub fn scan_gradle(root: &Path, prefixes: &[String]) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for group_dir in read_dirs(root) {
        let Some(group_id) = dir_name(&group_dir) else {
            continue;
        };
        if !prefixes.is_empty() && !prefixes.iter().any(|p| prefix_compatible(&group_id, p)) {
            continue;
        }
        for artifact_dir in read_dirs(&group_dir) {
            let Some(artifact_id) = dir_name(&artifact_dir) else {
                continue;
            };
            for version_dir in read_dirs(&artifact_dir) {
                let Some(version) = dir_name(&version_dir) else {
                    continue;
                };
                if let Some(artifact) =
                    gradle_artifact_from_version_dir(&version_dir, &group_id, &artifact_id, &version)
                {
                    artifacts.push(artifact);
                }
            }
        }
    }
    debug!(root = %root.display(), count = artifacts.len(), "gradle scan complete");
    artifacts
}

fn gradle_artifact_from_version_dir(
    version_dir: &Path,
    group_id: &str,
    artifact_id: &str,
    version: &str,
) -> Option<Artifact> {
    let mut main_jar: Option<PathBuf> = None;
    let mut has_source = false;

    for hash_dir in read_dirs(version_dir) {
        let Ok(entries) = std::fs::read_dir(&hash_dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with("-sources.jar") {
                has_source = true;
            } else if name.ends_with(".jar") && !name.ends_with("-javadoc.jar") {
                main_jar.get_or_insert(path);
            }
        }
    }

    main_jar.map(|abspath| Artifact {
        id: 0,
        group_id: group_id.to_string(),
        artifact_id: artifact_id.to_string(),
        version: version.to_string(),
        abspath,
        has_source,
        is_indexed: false,
    })
}

/// Absolute path of the artifact's main compiled jar, when it exists.
/// For the Maven layout `abspath` is the version directory; for Gradle it
/// is the jar itself.
pub fn main_archive_path(artifact: &Artifact) -> Option<PathBuf> {
    if artifact.abspath.is_file() {
        return Some(artifact.abspath.clone());
    }
    let jar = artifact.abspath.join(format!(
        "{}-{}.jar",
        artifact.artifact_id, artifact.version
    ));
    jar.is_file().then_some(jar)
}

/// Absolute path of the sibling `-sources.jar`, when it exists.
pub fn source_archive_path(artifact: &Artifact) -> Option<PathBuf> {
    let sources_name = format!(
        "{}-{}-sources.jar",
        artifact.artifact_id, artifact.version
    );
    if artifact.abspath.is_dir() {
        let candidate = artifact.abspath.join(&sources_name);
        return candidate.is_file().then_some(candidate);
    }
    // Gradle: hash directories sit under the version directory, and the
    // sources jar usually lives in a different hash dir than the main jar.
    let version_dir = artifact.abspath.parent()?.parent()?;
    for hash_dir in read_dirs(version_dir) {
        let candidate = hash_dir.join(&sources_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Directory-level include check, permissive in both directions: keep a
/// directory when its dotted path could still lead to (or already is
/// inside) an allowed prefix.
fn prefix_compatible(dotted: &str, prefix: &str) -> bool {
    dotted == prefix
        || dotted.starts_with(&format!("{prefix}."))
        || prefix.starts_with(&format!("{dotted}."))
}

fn dotted_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    Some(parts.join("."))
}

fn read_dirs(path: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(|s| s.to_string())
}
