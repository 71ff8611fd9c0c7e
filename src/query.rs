//! Read-side queries over the store.
//!
//! Thin scoring/grouping layer on top of the store statements. Class
//! results are grouped by fully qualified name, each carrying the list of
//! artifacts that contain the class. A malformed caller-supplied pattern
//! surfaces as [`JardexError::InvalidQuery`], never a panic.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::JardexError;
use crate::resolver::{self, VersionStrategy};
use crate::store::{Artifact, ClassHit, ResourceContent, ResourceHit, Store, escape_like};

/// One class grouped with every artifact carrying it, in rank order of
/// the underlying search.
#[derive(Debug, Clone, Serialize)]
pub struct ClassGroup {
    pub class_name: String,
    pub simple_name: String,
    pub artifacts: Vec<Artifact>,
}

pub struct QueryEngine {
    store: Arc<Store>,
}

impl QueryEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Substring match on groupId or artifactId.
    pub fn search_artifacts(&self, query: &str) -> Result<Vec<Artifact>, JardexError> {
        self.store
            .search_artifacts(query.trim())
            .map_err(|e| JardexError::InvalidQuery(e.to_string()))
    }

    /// Three search modes picked by inspecting the query:
    /// `regex:<pattern>`, glob (`*`/`?` present), else FTS fragments.
    ///
    /// The fragment mode runs a case-sensitive exact fq-name lookup first,
    /// so a class named exactly like the query always leads the results;
    /// FTS and glob matching stay case-insensitive.
    pub fn search_classes(&self, query: &str) -> Result<Vec<ClassGroup>, JardexError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let hits = if let Some(pattern) = query.strip_prefix("regex:") {
            // Validate eagerly so a bad pattern is a typed error instead
            // of a per-row SQL failure.
            Regex::new(pattern).map_err(|e| JardexError::InvalidQuery(e.to_string()))?;
            self.store
                .search_classes_regex(pattern)
                .map_err(|e| JardexError::InvalidQuery(e.to_string()))?
        } else if query.contains('*') || query.contains('?') {
            let pattern = glob_to_like(query);
            self.store
                .search_classes_like(&pattern)
                .map_err(|e| JardexError::InvalidQuery(e.to_string()))?
        } else {
            let mut hits = self
                .store
                .lookup_class_exact(query)
                .map_err(|e| JardexError::InvalidQuery(e.to_string()))?;
            let fragment_hits = match fts_match_expr(query) {
                Some(expr) => self
                    .store
                    .search_classes_fts(&expr)
                    .map_err(|e| JardexError::InvalidQuery(e.to_string()))?,
                // Below the trigram floor: contains-match instead.
                None => self
                    .store
                    .search_classes_like(&format!("%{}%", escape_like(query)))
                    .map_err(|e| JardexError::InvalidQuery(e.to_string()))?,
            };
            hits.extend(fragment_hits);
            hits
        };

        Ok(group_hits(hits))
    }

    /// Transitive subclasses/implementors of `fq_name`.
    pub fn search_implementations(&self, fq_name: &str) -> Result<Vec<ClassGroup>, JardexError> {
        let hits = self
            .store
            .descendants_of(fq_name.trim())
            .map_err(|e| JardexError::InvalidQuery(e.to_string()))?;
        Ok(group_hits(hits))
    }

    pub fn search_resources(&self, path_fragment: &str) -> Result<Vec<ResourceHit>, JardexError> {
        self.store
            .search_resources(path_fragment.trim())
            .map_err(|e| JardexError::InvalidQuery(e.to_string()))
    }

    pub fn resources_for_class(&self, fq_name: &str) -> Result<Vec<ResourceContent>, JardexError> {
        self.store
            .resources_for_class(fq_name.trim())
            .map_err(|e| JardexError::InvalidQuery(e.to_string()))
    }

    /// The preferred artifact for a class the caller did not pin to a
    /// coordinate.
    pub fn resolve_best_artifact(
        &self,
        fq_name: &str,
        strategy: VersionStrategy,
    ) -> Result<Artifact, JardexError> {
        let candidates = self
            .store
            .artifacts_for_class(fq_name)
            .map_err(|e| JardexError::InvalidQuery(e.to_string()))?;
        resolver::resolve_best_artifact(&candidates, strategy)
            .ok_or_else(|| JardexError::NotFound(format!("class not indexed: {fq_name}")))
    }
}

fn group_hits(hits: Vec<ClassHit>) -> Vec<ClassGroup> {
    let mut groups: Vec<ClassGroup> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for hit in hits {
        match by_name.get(&hit.fq_name) {
            Some(&idx) => {
                let group = &mut groups[idx];
                if !group.artifacts.iter().any(|a| a.id == hit.artifact.id) {
                    group.artifacts.push(hit.artifact);
                }
            }
            None => {
                by_name.insert(hit.fq_name.clone(), groups.len());
                groups.push(ClassGroup {
                    class_name: hit.fq_name,
                    simple_name: hit.simple_name,
                    artifacts: vec![hit.artifact],
                });
            }
        }
    }
    groups
}

/// Translate `*`/`?` globs into a LIKE pattern, escaping LIKE's own
/// wildcards first.
fn glob_to_like(glob: &str) -> String {
    escape_like(glob).replace('*', "%").replace('?', "_")
}

/// Build the FTS5 MATCH expression for a free-form term: the whole term as
/// a quoted prefix phrase, OR-ed with its alphanumeric fragments. `None`
/// when every candidate is below the trigram tokenizer's 3-char floor.
fn fts_match_expr(query: &str) -> Option<String> {
    let full = query.replace('"', "");
    let mut parts = Vec::new();
    if full.len() >= 3 {
        parts.push(format!("\"{full}\"*"));
    }
    for token in full.split(|c: char| !c.is_alphanumeric()) {
        if token.len() >= 3 && token != full {
            parts.push(format!("\"{token}\"*"));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ArtifactSymbols, ClassRow, EdgeKind, EdgeRow};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store(name: &str) -> Arc<Store> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "jardex_query_{}_{}_{}.db",
            std::process::id(),
            nanos,
            name
        ));
        Arc::new(Store::open(path).unwrap())
    }

    fn seed(store: &Store, group: &str, name: &str, version: &str, classes: &[&str]) -> i64 {
        store
            .upsert_artifacts(&[Artifact {
                id: 0,
                group_id: group.to_string(),
                artifact_id: name.to_string(),
                version: version.to_string(),
                abspath: PathBuf::from("/tmp/x"),
                has_source: false,
                is_indexed: false,
            }])
            .unwrap();
        let id = store
            .artifact_by_coordinate(group, name, version)
            .unwrap()
            .unwrap()
            .id;
        let symbols = ArtifactSymbols {
            classes: classes
                .iter()
                .map(|fq| ClassRow {
                    fq_name: fq.to_string(),
                    simple_name: fq.rsplit('.').next().unwrap().to_string(),
                })
                .collect(),
            ..Default::default()
        };
        store.ingest_artifact(id, &symbols).unwrap();
        id
    }

    #[test]
    fn fts_mode_groups_by_class_across_artifacts() {
        let store = temp_store("group");
        seed(&store, "com.test", "demo", "1.0", &["com.test.demo.TestUtils"]);
        seed(&store, "com.test", "demo", "2.0", &["com.test.demo.TestUtils"]);
        let engine = QueryEngine::new(store);

        let groups = engine.search_classes("TestUtils").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].class_name, "com.test.demo.TestUtils");
        assert_eq!(groups[0].artifacts.len(), 2);
    }

    #[test]
    fn exact_name_always_matches_and_leads_the_results() {
        let store = temp_store("exact");
        seed(
            &store,
            "com.test",
            "demo",
            "1.0",
            &[
                "com.test.demo.TestUtils",
                "com.test.demo.TestUtilsFactory",
                "com.other.TestUtils",
            ],
        );
        let engine = QueryEngine::new(store);

        // All three are FTS fragment matches, but the exact lookup pins
        // the literally-named class to the front regardless of rank.
        let groups = engine.search_classes("com.test.demo.TestUtils").unwrap();
        assert_eq!(groups[0].class_name, "com.test.demo.TestUtils");
        assert!(groups.len() >= 2);
        // Exact lookup stays case-sensitive; the fragment match still
        // finds the class case-insensitively.
        let groups = engine.search_classes("com.test.demo.testutils").unwrap();
        assert!(groups.iter().any(|g| g.class_name == "com.test.demo.TestUtils"));
    }

    #[test]
    fn glob_mode_translates_wildcards() {
        let store = temp_store("glob");
        seed(
            &store,
            "com.test",
            "demo",
            "1.0",
            &["com.test.demo.TestUtils", "com.test.demo.BestUtils"],
        );
        let engine = QueryEngine::new(store);

        let groups = engine.search_classes("Test*").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].simple_name, "TestUtils");

        let groups = engine.search_classes("?estUtils").unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn regex_mode_validates_the_pattern() {
        let store = temp_store("regex");
        seed(&store, "com.test", "demo", "1.0", &["com.test.demo.TestUtils"]);
        let engine = QueryEngine::new(store);

        let groups = engine.search_classes("regex:Test.*s$").unwrap();
        assert_eq!(groups.len(), 1);

        let err = engine.search_classes("regex:[unclosed").unwrap_err();
        assert!(matches!(err, JardexError::InvalidQuery(_)));
    }

    #[test]
    fn short_terms_fall_back_to_contains() {
        let store = temp_store("short");
        seed(&store, "com.test", "demo", "1.0", &["com.test.demo.Io"]);
        let engine = QueryEngine::new(store);

        let groups = engine.search_classes("Io").unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn implementations_walk_is_transitive() {
        let store = temp_store("impls");
        store
            .upsert_artifacts(&[Artifact {
                id: 0,
                group_id: "com.test".to_string(),
                artifact_id: "demo".to_string(),
                version: "1.0".to_string(),
                abspath: PathBuf::from("/tmp/x"),
                has_source: false,
                is_indexed: false,
            }])
            .unwrap();
        let id = store
            .artifact_by_coordinate("com.test", "demo", "1.0")
            .unwrap()
            .unwrap()
            .id;
        store
            .ingest_artifact(
                id,
                &ArtifactSymbols {
                    classes: ["a.Base", "a.Mid", "a.Leaf"]
                        .iter()
                        .map(|fq| ClassRow {
                            fq_name: fq.to_string(),
                            simple_name: fq.rsplit('.').next().unwrap().to_string(),
                        })
                        .collect(),
                    edges: vec![
                        EdgeRow {
                            class_name: "a.Mid".to_string(),
                            parent_name: "a.Base".to_string(),
                            kind: EdgeKind::Extends,
                        },
                        EdgeRow {
                            class_name: "a.Leaf".to_string(),
                            parent_name: "a.Mid".to_string(),
                            kind: EdgeKind::Implements,
                        },
                    ],
                    ..Default::default()
                },
            )
            .unwrap();
        let engine = QueryEngine::new(store);

        let groups = engine.search_implementations("a.Base").unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.class_name.as_str()).collect();
        assert_eq!(names, vec!["a.Leaf", "a.Mid"]);
    }

    #[test]
    fn fts_expr_shapes() {
        assert_eq!(
            fts_match_expr("com.test.Util").unwrap(),
            "\"com.test.Util\"* OR \"com\"* OR \"test\"* OR \"Util\"*"
        );
        assert!(fts_match_expr("ab").is_none());
        assert_eq!(fts_match_expr("Utils").unwrap(), "\"Utils\"*");
    }
}
