use anyhow::{Context, Result};
use clap::Parser;
use jardex::cfr::Cfr;
use jardex::cli::{Cli, Commands, DetailType};
use jardex::config::Config;
use jardex::detail::{DetailExtractor, DetailKind};
use jardex::error::JardexError;
use jardex::indexer::Indexer;
use jardex::query::QueryEngine;
use jardex::store::Store;
use jardex::watcher;
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Diagnostics on stderr; stdout carries only JSON responses.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jardex=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;

    if let Commands::Clear = cli.command {
        return clear_store(&config);
    }

    let store = Arc::new(Store::open(config.store_path.clone())?);
    let indexer = Indexer::new(Arc::clone(&store), config.clone());
    let engine = QueryEngine::new(Arc::clone(&store));

    match cli.command.clone() {
        Commands::Index => {
            let report = indexer.index()?;
            match report {
                Some(report) => print_json(&report)?,
                None => eprintln!("index already in progress"),
            }
        }
        Commands::Refresh => {
            let report = indexer.refresh()?;
            print_json(&report)?;
        }
        Commands::Watch => {
            let roots: Vec<_> = config
                .maven_repo
                .iter()
                .chain(config.gradle_repo.iter())
                .cloned()
                .collect();
            // The query surface is usable before the initial pass ends;
            // indexing stays in the background.
            let background = Arc::clone(&indexer);
            let initial = std::thread::spawn(move || {
                if let Err(e) = background.index() {
                    tracing::warn!(error = %e, "initial index failed");
                }
            });
            let _handle = watcher::start(Arc::clone(&indexer), &roots)?;
            let _ = initial.join();
            loop {
                std::thread::park();
            }
        }
        Commands::Classes { query } => print_query(engine.search_classes(&query))?,
        Commands::Artifacts { query } => print_query(engine.search_artifacts(&query))?,
        Commands::Implementations { class_name } => {
            print_query(engine.search_implementations(&class_name))?
        }
        Commands::Resources { pattern } => print_query(engine.search_resources(&pattern))?,
        Commands::Detail {
            class_name,
            detail_type,
            coordinate,
        } => {
            let artifact = match coordinate {
                Some(gav) => {
                    let (group, artifact, version) = parse_coordinate(&gav)?;
                    store
                        .artifact_by_coordinate(group, artifact, version)?
                        .with_context(|| format!("unknown artifact: {gav}"))?
                }
                None => match engine.resolve_best_artifact(&class_name, config.version_strategy) {
                    Ok(artifact) => artifact,
                    Err(e) => return print_failure(&e),
                },
            };

            let decompiler = config.decompiler_path.clone().map(Cfr::new);
            let extractor = DetailExtractor::new(decompiler, config.javap_tool.clone());
            let kind = match detail_type {
                DetailType::Signatures => DetailKind::Signatures,
                DetailType::Docs => DetailKind::Docs,
                DetailType::Source => DetailKind::Source,
            };
            match extractor.extract(&artifact, &class_name, kind) {
                Ok(Some(detail)) => print_json(&detail)?,
                Ok(None) => {
                    return print_failure(&JardexError::NotFound(format!(
                        "class {class_name} not found in {}",
                        artifact.coordinate()
                    )));
                }
                Err(e) => return print_failure(&e),
            }
        }
        Commands::Stats => print_json(&store.stats()?)?,
        Commands::Clear => unreachable!("handled above"),
    }

    Ok(())
}

fn print_query<T: Serialize>(result: Result<T, JardexError>) -> Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => print_failure(&e),
    }
}

#[derive(Serialize)]
struct Failure {
    error: String,
    kind: &'static str,
}

/// Structured failure on stdout, non-zero exit would break batch callers;
/// queries always exit 0 with an error payload.
fn print_failure(error: &JardexError) -> Result<()> {
    let kind = match error {
        JardexError::MalformedClass(_) => "malformed-class",
        JardexError::ArchiveUnreadable { .. } => "archive-unreadable",
        JardexError::DecompilerUnavailable(_) => "decompiler-unavailable",
        JardexError::InvalidQuery(_) => "invalid-query",
        JardexError::NotFound(_) => "not-found",
        JardexError::Configuration(_) => "configuration",
    };
    print_json(&Failure {
        error: error.to_string(),
        kind,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_coordinate(gav: &str) -> Result<(&str, &str, &str)> {
    let mut parts = gav.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(g), Some(a), Some(v), None) if !g.is_empty() && !a.is_empty() && !v.is_empty() => {
            Ok((g, a, v))
        }
        _ => anyhow::bail!("coordinate must be groupId:artifactId:version, got: {gav}"),
    }
}

fn clear_store(config: &Config) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut os = config.store_path.as_os_str().to_os_string();
        os.push(suffix);
        let path = std::path::PathBuf::from(os);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove store file: {}", path.display()))?;
        }
    }
    Ok(())
}
