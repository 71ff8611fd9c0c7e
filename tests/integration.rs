//! End-to-end flows over temporary Maven and Gradle roots: scan, ingest,
//! query, detail extraction, refresh.

use jardex::config::{Config, normalize_included_packages};
use jardex::detail::{DetailExtractor, DetailKind};
use jardex::indexer::Indexer;
use jardex::query::QueryEngine;
use jardex::resolver::{self, VersionStrategy};
use jardex::store::Store;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::SimpleFileOptions;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "jardex_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Minimal valid class file bytes: magic, constant pool with the class
/// and super class entries, access flags, this/super/interfaces.
fn class_bytes(name: &str, superclass: Option<&str>, interfaces: &[&str]) -> Vec<u8> {
    let mut constants: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut interface_indices = Vec::new();

    fn push_class(constants: &mut Vec<(u8, Vec<u8>)>, internal: &str) -> u16 {
        let utf_index = constants.len() as u16 + 1;
        let mut utf = (internal.len() as u16).to_be_bytes().to_vec();
        utf.extend_from_slice(internal.as_bytes());
        constants.push((1, utf));
        let class_index = constants.len() as u16 + 1;
        constants.push((7, utf_index.to_be_bytes().to_vec()));
        class_index
    }

    let this_index = push_class(&mut constants, name);
    let super_index = superclass
        .map(|s| push_class(&mut constants, s))
        .unwrap_or(0);
    for iface in interfaces {
        interface_indices.push(push_class(&mut constants, iface));
    }

    let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x37];
    out.extend_from_slice(&(constants.len() as u16 + 1).to_be_bytes());
    for (tag, body) in &constants {
        out.push(*tag);
        out.extend_from_slice(body);
    }
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&this_index.to_be_bytes());
    out.extend_from_slice(&super_index.to_be_bytes());
    out.extend_from_slice(&(interface_indices.len() as u16).to_be_bytes());
    for idx in interface_indices {
        out.extend_from_slice(&idx.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    out
}

fn config(base: &Path, maven: Option<PathBuf>, gradle: Option<PathBuf>, packages: &[&str]) -> Config {
    Config {
        maven_repo: maven,
        gradle_repo: gradle,
        included_packages: normalize_included_packages(
            &packages.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        ),
        decompiler_path: None,
        version_strategy: VersionStrategy::default(),
        store_path: base.join("index.db"),
        javap_tool: None,
    }
}

fn build(config: Config) -> (Arc<Store>, Arc<Indexer>, QueryEngine) {
    let store = Arc::new(Store::open(config.store_path.clone()).unwrap());
    let indexer = Indexer::new(Arc::clone(&store), config);
    let engine = QueryEngine::new(Arc::clone(&store));
    (store, indexer, engine)
}

const TEST_UTILS_SOURCE: &str = r#"package com.test.demo;

/**
 * Test class.
 */
public class TestUtils {
    public String echo(String input) {
        return input;
    }
}
"#;

fn write_demo_artifact(m2: &Path) {
    let version_dir = m2.join("com/test/demo/1.0.0");
    write_file(&version_dir.join("demo-1.0.0.pom"), b"<project/>");
    write_jar(
        &version_dir.join("demo-1.0.0.jar"),
        &[(
            "com/test/demo/TestUtils.class",
            class_bytes("com/test/demo/TestUtils", Some("java/lang/Object"), &[]),
        )],
    );
    write_jar(
        &version_dir.join("demo-1.0.0-sources.jar"),
        &[(
            "com/test/demo/TestUtils.java",
            TEST_UTILS_SOURCE.as_bytes().to_vec(),
        )],
    );
}

#[test]
fn maven_artifact_search_and_docs_extraction() {
    let base = temp_dir("maven_docs");
    let m2 = base.join("m2");
    write_demo_artifact(&m2);

    let (_store, indexer, engine) = build(config(&base, Some(m2), None, &[]));
    indexer.index().unwrap().unwrap();

    let groups = engine.search_classes("TestUtils").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].class_name, "com.test.demo.TestUtils");
    let artifact = groups[0].artifacts[0].clone();
    assert!(artifact.has_source);

    let extractor = DetailExtractor::new(None, None);
    let detail = extractor
        .extract(&artifact, "com.test.demo.TestUtils", DetailKind::Docs)
        .unwrap()
        .unwrap();
    assert!(detail
        .signatures
        .iter()
        .any(|s| s == "public String echo(String input)"));
    assert!(detail.doc.unwrap().contains("Test class."));
    assert!(!detail.used_decompilation);

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn included_packages_filter_applies_to_both_layout_and_symbols() {
    let base = temp_dir("prefix_filter");
    let m2 = base.join("m2");

    let allowed_dir = m2.join("com/test/allowed/1.0");
    write_file(&allowed_dir.join("allowed-1.0.pom"), b"<project/>");
    write_jar(
        &allowed_dir.join("allowed-1.0.jar"),
        &[(
            "com/test/Allowed.class",
            class_bytes("com/test/Allowed", Some("java/lang/Object"), &[]),
        )],
    );

    let other_dir = m2.join("com/other/ignored/1.0");
    write_file(&other_dir.join("ignored-1.0.pom"), b"<project/>");
    write_jar(
        &other_dir.join("ignored-1.0.jar"),
        &[(
            "com/other/Ignored.class",
            class_bytes("com/other/Ignored", Some("java/lang/Object"), &[]),
        )],
    );

    let (_store, indexer, engine) = build(config(&base, Some(m2), None, &["com.test.*"]));
    indexer.index().unwrap().unwrap();

    assert!(!engine.search_classes("Allowed").unwrap().is_empty());
    assert!(engine.search_classes("Ignored").unwrap().is_empty());

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn gradle_layout_is_indexed_and_searchable() {
    let base = temp_dir("gradle_e2e");
    let gradle = base.join("gradle");
    let hash_dir = gradle.join("com.gradle.test/demo-lib/2.0.0/9f8a7b");
    write_jar(
        &hash_dir.join("demo-lib-2.0.0.jar"),
        &[(
            "com/gradle/test/GradleUtils.class",
            class_bytes("com/gradle/test/GradleUtils", Some("java/lang/Object"), &[]),
        )],
    );

    let (_store, indexer, engine) = build(config(&base, None, Some(gradle), &[]));
    indexer.index().unwrap().unwrap();

    let artifacts = engine.search_artifacts("demo-lib").unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].coordinate(), "com.gradle.test:demo-lib:2.0.0");

    let groups = engine.search_classes("GradleUtils").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].class_name, "com.gradle.test.GradleUtils");

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn resolver_prefers_the_version_with_sources() {
    let base = temp_dir("resolver_pref");
    let m2 = base.join("m2");

    let v1 = m2.join("com/test/demo/1.0.0");
    write_file(&v1.join("demo-1.0.0.pom"), b"<project/>");
    write_jar(
        &v1.join("demo-1.0.0.jar"),
        &[(
            "com/test/demo/TestUtils.class",
            class_bytes("com/test/demo/TestUtils", Some("java/lang/Object"), &[]),
        )],
    );
    write_jar(
        &v1.join("demo-1.0.0-sources.jar"),
        &[(
            "com/test/demo/TestUtils.java",
            TEST_UTILS_SOURCE.as_bytes().to_vec(),
        )],
    );

    let v2 = m2.join("com/test/demo/2.0.0");
    write_file(&v2.join("demo-2.0.0.pom"), b"<project/>");
    write_jar(
        &v2.join("demo-2.0.0.jar"),
        &[(
            "com/test/demo/TestUtils.class",
            class_bytes("com/test/demo/TestUtils", Some("java/lang/Object"), &[]),
        )],
    );

    let (store, indexer, engine) = build(config(&base, Some(m2), None, &[]));
    indexer.index().unwrap().unwrap();

    let best = engine
        .resolve_best_artifact("com.test.demo.TestUtils", VersionStrategy::Semver)
        .unwrap();
    assert_eq!(best.version, "1.0.0");
    assert!(best.has_source);

    // Without the source tiebreak, 2.0.0 wins on version alone.
    let candidates = store.artifacts_for_class("com.test.demo.TestUtils").unwrap();
    let no_source: Vec<_> = candidates
        .into_iter()
        .map(|mut a| {
            a.has_source = false;
            a
        })
        .collect();
    let best = resolver::resolve_best_artifact(&no_source, VersionStrategy::Semver).unwrap();
    assert_eq!(best.version, "2.0.0");

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn proto_definitions_are_classes_and_resources() {
    let base = temp_dir("proto_e2e");
    let m2 = base.join("m2");
    let version_dir = m2.join("com/example/protos/1.0");
    write_file(&version_dir.join("protos-1.0.pom"), b"<project/>");

    let proto_text = br#"
syntax = "proto3";

package example.multi;

option java_package = "com.example.multi";
option java_outer_classname = "MultiProto";
option java_multiple_files = true;

message MultiMessage { string name = 1; }
enum MultiEnum { UNKNOWN = 0; }
"#;
    write_jar(
        &version_dir.join("protos-1.0.jar"),
        &[("proto/multi.proto", proto_text.to_vec())],
    );

    let (_store, indexer, engine) = build(config(&base, Some(m2), None, &[]));
    indexer.index().unwrap().unwrap();

    for name in ["MultiMessage", "MultiEnum", "MultiProto"] {
        assert!(
            !engine.search_classes(name).unwrap().is_empty(),
            "{name} should be findable"
        );
    }

    let resources = engine
        .resources_for_class("com.example.multi.MultiMessage")
        .unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].kind, "proto");
    assert!(resources[0].content.contains("message MultiMessage"));

    let hits = engine.search_resources("multi.proto").unwrap();
    assert_eq!(hits.len(), 1);

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn inheritance_queries_survive_refresh() {
    let base = temp_dir("refresh_e2e");
    let m2 = base.join("m2");
    let version_dir = m2.join("com/test/hier/1.0");
    write_file(&version_dir.join("hier-1.0.pom"), b"<project/>");
    write_jar(
        &version_dir.join("hier-1.0.jar"),
        &[
            (
                "com/test/hier/Animal.class",
                class_bytes("com/test/hier/Animal", Some("java/lang/Object"), &[]),
            ),
            (
                "com/test/hier/Dog.class",
                class_bytes("com/test/hier/Dog", Some("com/test/hier/Animal"), &[]),
            ),
            (
                "com/test/hier/Puppy.class",
                class_bytes("com/test/hier/Puppy", Some("com/test/hier/Dog"), &[]),
            ),
        ],
    );

    let (store, indexer, engine) = build(config(&base, Some(m2), None, &[]));
    indexer.index().unwrap().unwrap();

    let impls = engine.search_implementations("com.test.hier.Animal").unwrap();
    let names: Vec<&str> = impls.iter().map(|g| g.class_name.as_str()).collect();
    assert_eq!(names, vec!["com.test.hier.Dog", "com.test.hier.Puppy"]);

    let before = store.stats().unwrap();
    indexer.refresh().unwrap();
    let after = store.stats().unwrap();
    assert_eq!(before.classes, after.classes);
    assert_eq!(before.inheritance_edges, after.inheritance_edges);

    let impls = engine.search_implementations("com.test.hier.Animal").unwrap();
    assert_eq!(impls.len(), 2);

    let _ = std::fs::remove_dir_all(base);
}

#[test]
fn queries_answer_while_index_is_cold() {
    let base = temp_dir("cold_start");
    let m2 = base.join("m2");
    write_demo_artifact(&m2);

    // Store opened, nothing indexed yet: every query answers empty
    // instead of failing.
    let (_store, _indexer, engine) = build(config(&base, Some(m2), None, &[]));
    assert!(engine.search_classes("TestUtils").unwrap().is_empty());
    assert!(engine.search_artifacts("demo").unwrap().is_empty());
    assert!(engine
        .search_implementations("com.test.demo.TestUtils")
        .unwrap()
        .is_empty());

    let _ = std::fs::remove_dir_all(base);
}
