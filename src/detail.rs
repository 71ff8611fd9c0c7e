//! Per-class detail extraction.
//!
//! Given an artifact and a class name, produce method signatures, Javadoc,
//! or source text. Resolution is a fixed three-step chain, not runtime
//! polymorphism: the sibling sources jar first, then the signature
//! disassembler for the compiled class, then the decompiler as the
//! fallback of last resort.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::archive::Archive;
use crate::cfr::Cfr;
use crate::error::JardexError;
use crate::parse;
use crate::scan::{main_archive_path, source_archive_path};
use crate::store::Artifact;
use crate::structure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailKind {
    Signatures,
    Docs,
    Source,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassDetail {
    pub class_name: String,
    pub coordinate: String,
    pub signatures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub used_decompilation: bool,
}

pub struct DetailExtractor {
    decompiler: Option<Cfr>,
    javap_tool: Option<PathBuf>,
}

impl DetailExtractor {
    pub fn new(decompiler: Option<Cfr>, javap_tool: Option<PathBuf>) -> Self {
        Self {
            decompiler,
            javap_tool,
        }
    }

    /// Extract details for `class_name` out of `artifact`. `Ok(None)`
    /// when the class file cannot be found in the artifact at all.
    pub fn extract(
        &self,
        artifact: &Artifact,
        class_name: &str,
        kind: DetailKind,
    ) -> Result<Option<ClassDetail>, JardexError> {
        let Some(main_jar) = main_archive_path(artifact) else {
            return Ok(None);
        };
        let class_entry = format!("{}.class", class_name.replace('.', "/"));
        if !Archive::open(&main_jar)?.contains(&class_entry) {
            return Ok(None);
        }

        match kind {
            DetailKind::Signatures => self.extract_signatures(artifact, class_name, &main_jar),
            DetailKind::Docs | DetailKind::Source => {
                self.extract_from_source(artifact, class_name, &main_jar, kind)
            }
        }
    }

    /// Public API of the compiled class: the configured `javap`-style tool
    /// when available, else decompile and recover signatures from the text.
    fn extract_signatures(
        &self,
        artifact: &Artifact,
        class_name: &str,
        main_jar: &Path,
    ) -> Result<Option<ClassDetail>, JardexError> {
        if let Some(javap) = &self.javap_tool {
            let signatures = run_javap(javap, main_jar, class_name)?;
            return Ok(Some(ClassDetail {
                class_name: class_name.to_string(),
                coordinate: artifact.coordinate(),
                signatures,
                doc: None,
                source: None,
                language: None,
                content_hash: None,
                used_decompilation: false,
            }));
        }

        let text = self.decompile(main_jar, class_name)?;
        Ok(Some(ClassDetail {
            class_name: class_name.to_string(),
            coordinate: artifact.coordinate(),
            signatures: parse::extract_method_signatures(&text),
            doc: None,
            source: None,
            language: None,
            content_hash: Some(parse::content_digest(&text)),
            used_decompilation: true,
        }))
    }

    fn extract_from_source(
        &self,
        artifact: &Artifact,
        class_name: &str,
        main_jar: &Path,
        kind: DetailKind,
    ) -> Result<Option<ClassDetail>, JardexError> {
        if artifact.has_source
            && let Some(sources_jar) = source_archive_path(artifact)
            && let Some((text, language)) = read_source_entry(&sources_jar, class_name)?
        {
            let signatures = match language {
                // The AST walk handles annotations and multi-line
                // declarations; the heuristics cover everything else.
                "java" => structure::parse_source_structure(&text)
                    .map(|s| s.signatures)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| parse::extract_method_signatures(&text)),
                _ => parse::extract_method_signatures(&text),
            };
            return Ok(Some(ClassDetail {
                class_name: class_name.to_string(),
                coordinate: artifact.coordinate(),
                signatures,
                doc: parse::extract_javadoc(&text),
                source: (kind == DetailKind::Source).then(|| text.clone()),
                language: Some(language.to_string()),
                content_hash: Some(parse::content_digest(&text)),
                used_decompilation: false,
            }));
        }

        debug!(class = class_name, "no source archive hit, decompiling");
        let decompiled = self.decompile(main_jar, class_name)?;
        let units = parse::split_decompiled_units(&decompiled);
        let text = units
            .into_iter()
            .find(|u| u.class_name == class_name)
            .map(|u| u.text)
            .unwrap_or(decompiled);

        Ok(Some(ClassDetail {
            class_name: class_name.to_string(),
            coordinate: artifact.coordinate(),
            signatures: parse::extract_method_signatures(&text),
            doc: parse::extract_javadoc(&text),
            source: (kind == DetailKind::Source).then(|| text.clone()),
            language: Some("java".to_string()),
            content_hash: Some(parse::content_digest(&text)),
            used_decompilation: true,
        }))
    }

    fn decompile(&self, main_jar: &Path, class_name: &str) -> Result<String, JardexError> {
        let Some(cfr) = &self.decompiler else {
            return Err(JardexError::DecompilerUnavailable(
                "no decompiler configured".to_string(),
            ));
        };
        cfr.decompile_class(main_jar, class_name)
    }
}

/// Look for `<ClassName>.java` or `<ClassName>.kt` in the sources jar.
fn read_source_entry(
    sources_jar: &Path,
    class_name: &str,
) -> Result<Option<(String, &'static str)>, JardexError> {
    let mut archive = match Archive::open(sources_jar) {
        Ok(a) => a,
        // A corrupt sources jar falls through to the decompiler.
        Err(_) => return Ok(None),
    };
    let base = class_name.replace('.', "/");
    for (ext, language) in [("java", "java"), ("kt", "kotlin")] {
        let entry = format!("{base}.{ext}");
        if archive.contains(&entry) {
            let text = archive.read_entry_string(&entry)?;
            return Ok(Some((text, language)));
        }
    }
    Ok(None)
}

/// Run the external signature disassembler over one class and keep its
/// member declaration lines.
fn run_javap(javap: &Path, jar: &Path, class_name: &str) -> Result<Vec<String>, JardexError> {
    let output = Command::new(javap)
        .arg("-public")
        .arg("-classpath")
        .arg(jar)
        .arg(class_name)
        .output()
        .map_err(|e| {
            JardexError::DecompilerUnavailable(format!(
                "failed to launch signature tool {}: {e}",
                javap.display()
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(JardexError::DecompilerUnavailable(format!(
            "signature tool failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let signatures = stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with(';') && line.contains('('))
        .map(|line| line.trim_end_matches(';').trim().to_string())
        .collect();
    Ok(signatures)
}
