//! Index orchestration.
//!
//! Owns the write side of the store: synchronizes scanner output into
//! artifact rows, drives per-artifact archive ingestion in chunks, and
//! guards the whole pass behind a single-flight flag. Background failures
//! are logged and swallowed; an artifact whose archive cannot be read is
//! still marked indexed so it is not retried on every pass.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::archive::Archive;
use crate::classfile;
use crate::config::{Config, class_matches_prefixes};
use crate::proto;
use crate::scan;
use crate::store::{
    Artifact, ArtifactSymbols, ClassRow, EdgeKind, EdgeRow, ResourceRow, Store,
};

/// Artifacts ingested per chunk; parsing runs in parallel inside a chunk,
/// commits stay sequential per artifact.
const CHUNK_SIZE: usize = 50;

const REFRESH_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub scanned: usize,
    pub ingested: usize,
    pub failed: usize,
}

pub struct Indexer {
    store: Arc<Store>,
    config: Config,
    indexing: AtomicBool,
}

impl Indexer {
    pub fn new(store: Arc<Store>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            indexing: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one full index pass. Re-entry while a pass is running is a
    /// no-op returning `None`; concurrent triggers coalesce into the
    /// in-flight run.
    pub fn index(&self) -> Result<Option<IndexReport>> {
        let Some(_guard) = self.try_acquire() else {
            info!("index already in progress, skipping");
            return Ok(None);
        };
        self.run_index().map(Some)
    }

    /// Reset the store and re-index from scratch. Waits for an in-flight
    /// pass to finish so an in-progress artifact commit is never
    /// clobbered.
    pub fn refresh(&self) -> Result<IndexReport> {
        let _guard = loop {
            if let Some(guard) = self.try_acquire() {
                break guard;
            }
            std::thread::sleep(REFRESH_WAIT);
        };
        self.store.refresh_all()?;
        info!("store reset, re-indexing");
        self.run_index()
    }

    fn try_acquire(&self) -> Option<IndexingGuard<'_>> {
        self.indexing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| IndexingGuard { flag: &self.indexing })
    }

    fn run_index(&self) -> Result<IndexReport> {
        let mut report = IndexReport::default();

        if !self.config.has_any_root() {
            warn!("no repository root exists, nothing to index");
            return Ok(report);
        }

        let prefixes = &self.config.included_packages;
        let mut artifacts = Vec::new();
        if let Some(root) = &self.config.maven_repo {
            artifacts.extend(scan::scan_maven(root, prefixes));
        }
        if let Some(root) = &self.config.gradle_repo {
            artifacts.extend(scan::scan_gradle(root, prefixes));
        }
        report.scanned = artifacts.len();

        self.store
            .upsert_artifacts(&artifacts)
            .context("Failed to synchronize scanned artifacts")?;

        if self.store.reset_if_missing_inheritance()? {
            info!("inheritance table was empty, re-ingesting indexed artifacts");
        }

        let pending = self.store.find_unindexed()?;
        info!(pending = pending.len(), "ingesting unindexed artifacts");

        for chunk in pending.chunks(CHUNK_SIZE) {
            let parsed: Vec<(i64, ArtifactSymbols, bool)> = chunk
                .par_iter()
                .map(|artifact| {
                    let (symbols, ok) = self.read_artifact_symbols(artifact);
                    (artifact.id, symbols, ok)
                })
                .collect();

            for (artifact_id, symbols, ok) in parsed {
                match self.store.ingest_artifact(artifact_id, &symbols) {
                    Ok(()) => {
                        report.ingested += 1;
                        if !ok {
                            report.failed += 1;
                        }
                    }
                    Err(e) => {
                        // Store-level failure: leave the artifact
                        // unindexed and let the next pass retry.
                        report.failed += 1;
                        warn!(artifact_id, error = %e, "failed to commit artifact");
                    }
                }
            }
        }

        info!(
            scanned = report.scanned,
            ingested = report.ingested,
            failed = report.failed,
            "index pass complete"
        );
        Ok(report)
    }

    /// Parse one artifact's archive into rows. Never fails: a missing or
    /// unreadable archive yields empty symbols (and `false`) so the
    /// artifact is still marked indexed.
    fn read_artifact_symbols(&self, artifact: &Artifact) -> (ArtifactSymbols, bool) {
        let Some(jar) = scan::main_archive_path(artifact) else {
            // pom-only artifact: nothing to ingest, but mark it indexed
            // so it does not come back on the next pass.
            return (ArtifactSymbols::default(), true);
        };

        let mut archive = match Archive::open(&jar) {
            Ok(a) => a,
            Err(e) => {
                warn!(artifact = %artifact.coordinate(), error = %e, "unreadable archive");
                return (ArtifactSymbols::default(), false);
            }
        };

        let names = match archive.entry_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(artifact = %artifact.coordinate(), error = %e, "unreadable archive");
                return (ArtifactSymbols::default(), false);
            }
        };

        let mut symbols = ArtifactSymbols::default();
        let prefixes = &self.config.included_packages;
        for name in names {
            if name.ends_with(".class") {
                self.read_class_entry(&mut archive, &name, prefixes, &mut symbols);
            } else if name.ends_with(".proto") {
                self.read_proto_entry(&mut archive, &name, prefixes, &mut symbols);
            }
        }

        // A jar can carry both a proto and its generated classes; one
        // class row per fq name is enough.
        let mut seen = std::collections::HashSet::new();
        symbols.classes.retain(|c| seen.insert(c.fq_name.clone()));

        (symbols, true)
    }

    fn read_class_entry(
        &self,
        archive: &mut Archive,
        entry: &str,
        prefixes: &[String],
        symbols: &mut ArtifactSymbols,
    ) {
        // Nested classes and synthetic descriptors are not indexed.
        if entry.contains('$')
            || entry.ends_with("module-info.class")
            || entry.ends_with("package-info.class")
        {
            return;
        }
        let Ok(bytes) = archive.read_entry(entry) else {
            return;
        };
        let info = match classfile::read_class(&bytes) {
            Ok(info) => info,
            Err(e) => {
                warn!(entry, error = %e, "skipping malformed class");
                return;
            }
        };
        if !class_matches_prefixes(&info.class_name, prefixes) {
            return;
        }

        let simple_name = simple_name_of(&info.class_name).to_string();
        if let Some(parent) = info.super_class.filter(|p| p != "java.lang.Object") {
            symbols.edges.push(EdgeRow {
                class_name: info.class_name.clone(),
                parent_name: parent,
                kind: EdgeKind::Extends,
            });
        }
        for iface in info.interfaces {
            symbols.edges.push(EdgeRow {
                class_name: info.class_name.clone(),
                parent_name: iface,
                kind: EdgeKind::Implements,
            });
        }
        symbols.classes.push(ClassRow {
            fq_name: info.class_name,
            simple_name,
        });
    }

    fn read_proto_entry(
        &self,
        archive: &mut Archive,
        entry: &str,
        prefixes: &[String],
        symbols: &mut ArtifactSymbols,
    ) {
        let Ok(content) = archive.read_entry_string(entry) else {
            return;
        };
        let parsed = proto::read_proto(&content);
        let base_name = Path::new(entry)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Proto");
        let classes = proto::generated_class_names(&parsed, base_name);

        // The generated classes are findable by name even when the
        // library ships only the schema.
        for fq_name in &classes {
            if class_matches_prefixes(fq_name, prefixes) {
                symbols.classes.push(ClassRow {
                    fq_name: fq_name.clone(),
                    simple_name: simple_name_of(fq_name).to_string(),
                });
            }
        }

        symbols.resources.push(ResourceRow {
            path: entry.to_string(),
            content,
            kind: "proto".to_string(),
            classes,
        });
    }
}

struct IndexingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn simple_name_of(fq_name: &str) -> &str {
    fq_name.rsplit('.').next().unwrap_or(fq_name)
}
