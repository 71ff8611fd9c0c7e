use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::resolver::VersionStrategy;

/// Resolved runtime configuration for the indexer and query engine.
///
/// The CLI adapter builds this from flags, environment variables, and
/// platform defaults; the core components only ever see this struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub maven_repo: Option<PathBuf>,
    pub gradle_repo: Option<PathBuf>,
    /// Normalized package prefixes; empty means "all packages".
    pub included_packages: Vec<String>,
    pub decompiler_path: Option<PathBuf>,
    pub version_strategy: VersionStrategy,
    pub store_path: PathBuf,
    pub javap_tool: Option<PathBuf>,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let maven_repo = resolve_optional_root(cli.maven.clone(), "JARDEX_MAVEN_REPO")
            .or_else(|| default_m2_repository().ok().filter(|p| p.is_dir()));
        let gradle_repo = resolve_optional_root(cli.gradle.clone(), "JARDEX_GRADLE_REPO")
            .or_else(|| default_gradle_repository().ok().filter(|p| p.is_dir()));

        let raw_packages: Vec<String> = match &cli.packages {
            Some(list) => list.split(',').map(|s| s.to_string()).collect(),
            None => env::var("JARDEX_INCLUDED_PACKAGES")
                .map(|v| v.split(',').map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        };

        let version_strategy = match &cli.strategy {
            Some(raw) => VersionStrategy::parse(raw)?,
            None => VersionStrategy::default(),
        };

        Ok(Self {
            maven_repo,
            gradle_repo,
            included_packages: normalize_included_packages(&raw_packages),
            decompiler_path: cli.cfr.clone().or_else(|| env_path("CFR_JAR")),
            version_strategy,
            store_path: resolve_store_path(cli)?,
            javap_tool: cli.javap.clone().or_else(|| env_path("JARDEX_JAVAP")),
        })
    }

    /// True when at least one repository root exists on disk.
    pub fn has_any_root(&self) -> bool {
        self.maven_repo.as_deref().is_some_and(Path::is_dir)
            || self.gradle_repo.as_deref().is_some_and(Path::is_dir)
    }
}

pub fn default_m2_repository() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))?;
    Ok(home.join(".m2").join("repository"))
}

pub fn default_gradle_repository() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))?;
    Ok(home
        .join(".gradle")
        .join("caches")
        .join("modules-2")
        .join("files-2.1"))
}

pub fn resolve_store_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }
    if let Some(p) = env_path("JARDEX_DB") {
        return Ok(p);
    }
    Ok(jardex_home()?.join("index.db"))
}

pub fn jardex_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("jardex"))
}

fn resolve_optional_root(flag: Option<PathBuf>, env_key: &str) -> Option<PathBuf> {
    flag.or_else(|| env_path(env_key))
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Normalize the `includedPackages` option into sorted, wildcard-free,
/// prefix-absorbed form. An empty result means "all packages".
///
/// A bare `"*"` (or an entry that reduces to empty) widens the filter to
/// everything, so the whole list collapses to the empty form.
pub fn normalize_included_packages(raw: &[String]) -> Vec<String> {
    let mut cleaned = Vec::new();
    for entry in raw {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let stripped = trimmed.strip_suffix(".*").unwrap_or(trimmed);
        let stripped = stripped.trim_matches('*').trim_matches('.');
        if stripped.is_empty() {
            return Vec::new();
        }
        cleaned.push(stripped.to_string());
    }

    cleaned.sort();
    cleaned.dedup();

    let mut absorbed: Vec<String> = Vec::new();
    for prefix in cleaned {
        let covered = absorbed
            .iter()
            .any(|kept| prefix == *kept || prefix.starts_with(&format!("{kept}.")));
        if !covered {
            absorbed.push(prefix);
        }
    }
    absorbed
}

/// True when `fq_name` falls under one of the normalized prefixes.
/// An empty prefix list accepts everything.
pub fn class_matches_prefixes(fq_name: &str, prefixes: &[String]) -> bool {
    if prefixes.is_empty() {
        return true;
    }
    prefixes
        .iter()
        .any(|p| fq_name == *p || fq_name.starts_with(&format!("{p}.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_strips_wildcards_and_absorbs_subprefixes() {
        let raw = strings(&["com.test.*", "com.test", "com.test.demo", "com.other"]);
        assert_eq!(
            normalize_included_packages(&raw),
            strings(&["com.other", "com.test"])
        );
    }

    #[test]
    fn normalize_star_means_all() {
        assert_eq!(
            normalize_included_packages(&strings(&["*"])),
            Vec::<String>::new()
        );
        assert_eq!(
            normalize_included_packages(&strings(&[""])),
            Vec::<String>::new()
        );
        assert_eq!(
            normalize_included_packages(&strings(&["com.a", "*"])),
            Vec::<String>::new()
        );
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let raw = strings(&["org.b", "org.a", "org.b"]);
        assert_eq!(
            normalize_included_packages(&raw),
            strings(&["org.a", "org.b"])
        );
    }

    #[test]
    fn class_prefix_filter_matches_exact_and_nested() {
        let prefixes = strings(&["com.test"]);
        assert!(class_matches_prefixes("com.test.Allowed", &prefixes));
        assert!(class_matches_prefixes("com.test.deep.Allowed", &prefixes));
        assert!(!class_matches_prefixes("com.other.Ignored", &prefixes));
        assert!(!class_matches_prefixes("com.testing.Tricky", &prefixes));
        assert!(class_matches_prefixes("anything.At.All", &[]));
    }
}
