//! Diagram include tests against the filesystem

use std::fs;
use std::path::Path;

use smalldb::prelude::*;
use smalldb::{DiagramsExtension, Definition};

fn write(dir: &Path, file: &str, content: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn include(file: &str, group: Option<&str>) -> DirectiveKind {
    DirectiveKind::IncludeDiagram {
        file: file.to_string(),
        format: None,
        group: group.map(str::to_string),
        svg_file: None,
    }
}

fn build(dir: &Path, source: MachineSource) -> Result<Definition, BuildError> {
    Pipeline::with_default_preprocessors(BuildConfig::default().with_base_dir(dir)).build(&source)
}

const SHARED: &str = "stateDiagram-v2\n\
    state Editor {\n\
        [*] --> draft : create\n\
        draft --> review : submit\n\
        review --> draft : reject\n\
    }\n\
    state Publisher {\n\
        published --> [*] : delete\n\
    }\n\
    review --> published : publish\n";

#[test]
fn test_diamond_include_matches_single_include() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/main.mmd", "stateDiagram-v2\n%% include left/left.mmd\n%% include right/right.mmd\n");
    write(dir.path(), "article/left/left.mmd", "stateDiagram-v2\n%% include ../shared.mmd\n");
    write(dir.path(), "article/right/right.mmd", "stateDiagram-v2\n%% include ../shared.mmd\n");
    write(dir.path(), "article/shared.mmd", SHARED);

    let diamond = build(dir.path(), MachineSource::new("Article", "article").directive(include("main.mmd", None))).unwrap();
    let single = build(dir.path(), MachineSource::new("Article", "article").directive(include("shared.mmd", None))).unwrap();

    assert_eq!(diamond.state_names(), single.state_names());
    assert_eq!(diamond.transitions(), single.transitions());
    assert_eq!(diamond.transition_count(), 5);

    let diagrams = diamond.extension::<DiagramsExtension>().unwrap();
    let shared: Vec<_> = diagrams
        .diagrams
        .iter()
        .filter(|d| d.file.ends_with("shared.mmd"))
        .collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(diagrams.diagrams.len(), 4);
}

#[test]
fn test_cyclic_includes_terminate() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/a.mmd", "stateDiagram-v2\n%% include sub/b.mmd\ndraft --> review : submit\n");
    write(dir.path(), "article/sub/b.mmd", "stateDiagram-v2\n%% include ../a.mmd\nreview --> draft : reject\n");

    let def = build(dir.path(), MachineSource::new("Article", "article").directive(include("a.mmd", None))).unwrap();
    assert_eq!(def.state_count(), 2);
    assert_eq!(def.transition_count(), 2);

    let diagrams = &def.extension::<DiagramsExtension>().unwrap().diagrams;
    assert_eq!(diagrams.len(), 2);
    assert!(diagrams[0].file.ends_with("a.mmd"));
    assert!(diagrams[1].file.ends_with("b.mmd"));
}

#[test]
fn test_group_includes() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/shared.mmd", SHARED);

    let source = MachineSource::new("Article", "article")
        .directive(include("shared.mmd", Some("Editor")))
        .directive(include("./shared.mmd", Some("Editor")));
    let def = build(dir.path(), source).unwrap();
    assert_eq!(def.state_count(), 2);
    assert!(def.transition("draft", "submit").is_some());
    assert!(def.transition("review", "publish").is_none());

    let source = MachineSource::new("Article", "article")
        .directive(include("shared.mmd", Some("Editor")))
        .directive(include("shared.mmd", Some("Publisher")));
    let def = build(dir.path(), source).unwrap();
    // Edges between two groups belong to neither
    assert!(def.has_state(&StateName::from("published")));
    assert!(def.transition("published", "delete").is_some());
    assert!(def.transition("review", "publish").is_none());
}

#[test]
fn test_diagram_may_complete_declared_states() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/extra.mmd", "stateDiagram-v2\npublished --> archived : archive\n");

    let source = MachineSource::new("Article", "article")
        .directive(DirectiveKind::State {
            name: "published".to_string(),
            color: Some("green".to_string()),
            label: None,
        })
        .directive(include("extra.mmd", None));
    let def = build(dir.path(), source).unwrap();
    assert_eq!(def.state("published").unwrap().color(), Some("green"));
    assert!(def.has_state(&StateName::from("archived")));
}

#[test]
fn test_json_diagram_include() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "article/article.json",
        r##"{
            "nodes": [
                {"id": "start", "kind": "not_exists"},
                {"id": "draft", "color": "#eee"}
            ],
            "edges": [{"source": "start", "target": "draft", "label": "create"}]
        }"##,
    );

    let def = build(dir.path(), MachineSource::new("Article", "article").directive(include("article.json", None))).unwrap();
    assert!(def.transition("", "create").is_some());
    assert!(def.has_state(&StateName::from("draft")));
}

#[test]
fn test_diagram_contradicting_declaration() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/article.mmd", SHARED);

    let source = MachineSource::new("Article", "article")
        .directive(DirectiveKind::State {
            name: "draft".to_string(),
            color: None,
            label: None,
        })
        .directive(DirectiveKind::Transition {
            source: Some("draft".to_string()),
            targets: vec!["draft".to_string()],
            name: Some("submit".to_string()),
            color: None,
            access_policy: None,
        })
        .directive(include("article.mmd", None));

    let err = build(dir.path(), source).unwrap_err();
    assert_eq!(err.error_code(), "DIAGRAM_MISMATCH");
}

#[test]
fn test_missing_include() {
    let dir = tempfile::tempdir().unwrap();
    let err = build(dir.path(), MachineSource::new("Article", "article").directive(include("nowhere.mmd", None))).unwrap_err();
    assert!(matches!(err, BuildError::FileNotFound { ref file, .. } if file.ends_with("nowhere.mmd")));
}

#[test]
fn test_broken_diagram_reports_location() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "article/broken.mmd", "stateDiagram-v2\ndraft --> review\ndraft -> review\n");

    let err = build(dir.path(), MachineSource::new("Article", "article").directive(include("broken.mmd", None))).unwrap_err();
    assert_eq!(err.error_code(), "DIAGRAM_LOAD");
    assert!(err.to_string().contains("broken.mmd"));
    assert!(err.to_string().contains("line 3"));
}
