use feature_engine::{Engine, EngineConfig, FeatureKind};
use file_format::{
    load_project, save_project, LoadError, ProjectFile, ProjectMetadata, FORMAT_NAME,
    FORMAT_VERSION,
};
use geom_kernel::{BooleanKind, MockKernel, ShapeKind};
use seer_types::InputRole;
use uuid::Uuid;

// ── Helper Functions ─────────────────────────────────────────────────────

fn box_kind(length: f64) -> FeatureKind {
    FeatureKind::Box {
        length,
        width: 1.0,
        height: 1.0,
    }
}

/// Box → Pattern(3), Box → Chamfer on one box edge, and a Union of two boxes.
fn make_model(kernel: &mut MockKernel) -> Engine {
    let mut engine = Engine::new(EngineConfig::deterministic(7));
    let a = engine.add_feature("Box A", box_kind(1.0));
    let b = engine.add_feature("Box B", box_kind(0.5));
    let pattern = engine.add_feature(
        "Pattern",
        FeatureKind::Instance {
            count: 3,
            spacing: [2.0, 0.0, 0.0],
        },
    );
    let union = engine.add_feature(
        "Union",
        FeatureKind::Boolean {
            operation: BooleanKind::Union,
        },
    );
    engine.connect(a, pattern, InputRole::Target).unwrap();
    engine.connect(a, union, InputRole::Target).unwrap();
    engine.connect(b, union, InputRole::Tool).unwrap();
    engine.recompute_all(kernel);

    let table = engine.table(a).unwrap();
    let edge = table.records()[table.of_kind(ShapeKind::Edge)[0]].id.unwrap();
    let pick = engine.make_pick(a, edge).unwrap();
    let chamfer = engine.add_feature(
        "Chamfer",
        FeatureKind::Chamfer {
            distance: 0.1,
            edges: vec![pick],
        },
    );
    engine.connect(a, chamfer, InputRole::Target).unwrap();
    engine.recompute_all(kernel);
    assert!(engine.errors.is_empty());
    engine
}

fn all_ids(engine: &Engine) -> Vec<(Uuid, Vec<Uuid>)> {
    engine
        .graph
        .features()
        .map(|f| (f.id, f.table.get_all_ids()))
        .collect()
}

fn saved_json() -> String {
    let mut kernel = MockKernel::new();
    let engine = make_model(&mut kernel);
    save_project(&engine, &ProjectMetadata::new("Test Project")).unwrap()
}

// ── Save Tests ──────────────────────────────────────────────────────────

#[test]
fn save_includes_format_and_version() {
    let parsed: serde_json::Value = serde_json::from_str(&saved_json()).unwrap();
    assert_eq!(parsed["format"], FORMAT_NAME);
    assert_eq!(parsed["version"], FORMAT_VERSION);
    assert_eq!(parsed["project"]["name"], "Test Project");
    assert!(parsed["project"]["created"].is_string());
}

#[test]
fn save_serializes_features_and_connections() {
    let parsed: serde_json::Value = serde_json::from_str(&saved_json()).unwrap();
    let features = parsed["features"].as_array().unwrap();
    assert_eq!(features.len(), 5);
    assert_eq!(features[0]["kind"]["type"], "Box");
    assert_eq!(features[0]["tags"].as_array().unwrap().len(), 8);
    assert_eq!(features[4]["kind"]["type"], "Chamfer");
    assert_eq!(parsed["connections"].as_array().unwrap().len(), 4);
}

#[test]
fn save_writes_identity_bookkeeping() {
    let parsed: serde_json::Value = serde_json::from_str(&saved_json()).unwrap();
    let features = parsed["features"].as_array().unwrap();
    assert!(!features[0]["derived"].as_array().unwrap().is_empty());
    assert!(!features[2]["ledger"].as_array().unwrap().is_empty());
    assert_eq!(features[3]["mapper"]["edges"].as_array().unwrap().len(), 1);
    assert!(!parsed["history"]["vertices"].as_array().unwrap().is_empty());
    assert!(!parsed["history"]["edges"].as_array().unwrap().is_empty());
}

#[test]
fn save_empty_engine() {
    let engine = Engine::new(EngineConfig::default());
    let json = save_project(&engine, &ProjectMetadata::new("Empty")).unwrap();
    let (loaded, meta) = load_project(&json, EngineConfig::default()).unwrap();
    assert!(loaded.graph.is_empty());
    assert_eq!(meta.name, "Empty");
}

// ── Load Tests ──────────────────────────────────────────────────────────

#[test]
fn reload_reproduces_every_id() {
    let mut kernel = MockKernel::new();
    let engine = make_model(&mut kernel);
    let expected = all_ids(&engine);
    let json = save_project(&engine, &ProjectMetadata::new("Round Trip")).unwrap();

    // Random ids: anything not recovered from the file would differ.
    let (mut loaded, _) = load_project(&json, EngineConfig::default()).unwrap();
    assert!(loaded.graph.features().all(|f| f.state.dirty && f.table.is_empty()));

    let mut fresh_kernel = MockKernel::new();
    loaded.recompute_all(&mut fresh_kernel);
    assert!(loaded.errors.is_empty());
    assert!(loaded.diagnostics.is_empty());
    assert_eq!(all_ids(&loaded), expected);
    assert_eq!(loaded.history.nodes(), engine.history.nodes());
    assert_eq!(loaded.history.edges(), engine.history.edges());
}

#[test]
fn reload_with_same_seed_mints_fresh_ids() {
    let mut kernel = MockKernel::new();
    let engine = make_model(&mut kernel);
    let mut used: Vec<Uuid> = Vec::new();
    for (feature, ids) in all_ids(&engine) {
        used.push(feature);
        used.extend(ids);
    }
    let json = save_project(&engine, &ProjectMetadata::new("Resume")).unwrap();

    let (mut loaded, _) = load_project(&json, EngineConfig::deterministic(7)).unwrap();
    let mut fresh_kernel = MockKernel::new();
    loaded.recompute_all(&mut fresh_kernel);
    assert_eq!(all_ids(&loaded), all_ids(&engine));

    let extra = loaded.add_feature("Box C", box_kind(3.0));
    loaded.recompute_all(&mut fresh_kernel);
    assert!(loaded.errors.is_empty());
    assert!(!used.contains(&extra));
    let minted = loaded.table(extra).unwrap().get_all_ids();
    assert!(minted.iter().all(|id| !used.contains(id)));
}

#[test]
fn reload_keeps_graph_and_flags() {
    let mut kernel = MockKernel::new();
    let mut engine = make_model(&mut kernel);
    let pattern = engine.graph.features().nth(2).unwrap().id;
    engine.set_skipped(pattern, true).unwrap();
    let json = save_project(&engine, &ProjectMetadata::new("Flags")).unwrap();

    let (loaded, _) = load_project(&json, EngineConfig::default()).unwrap();
    assert_eq!(loaded.graph.connections(), engine.graph.connections());
    assert!(loaded.feature(pattern).unwrap().state.skipped);
    let before: Vec<_> = engine.graph.features().map(|f| f.kind.clone()).collect();
    let after: Vec<_> = loaded.graph.features().map(|f| f.kind.clone()).collect();
    assert_eq!(before, after);
}

#[test]
fn load_rejects_unknown_format() {
    let json = saved_json().replace(FORMAT_NAME, "something-else");
    let result = load_project(&json, EngineConfig::default());
    assert!(matches!(result, Err(LoadError::UnknownFormat(_))));
}

#[test]
fn load_rejects_future_version() {
    let mut file: ProjectFile = serde_json::from_str(&saved_json()).unwrap();
    file.version = FORMAT_VERSION + 1;
    let json = serde_json::to_string(&file).unwrap();
    let result = load_project(&json, EngineConfig::default());
    assert!(matches!(
        result,
        Err(LoadError::FutureVersion {
            file_version,
            supported_version,
        }) if file_version == FORMAT_VERSION + 1 && supported_version == FORMAT_VERSION
    ));
}

#[test]
fn load_rejects_old_version_without_migration() {
    let mut file: ProjectFile = serde_json::from_str(&saved_json()).unwrap();
    file.version = 0;
    let json = serde_json::to_string(&file).unwrap();
    let result = load_project(&json, EngineConfig::default());
    assert!(matches!(result, Err(LoadError::MigrationFailed { from: 0, .. })));
}

#[test]
fn load_rejects_garbage() {
    let result = load_project("{ not json", EngineConfig::default());
    assert!(matches!(result, Err(LoadError::ParseError(_))));
}

#[test]
fn load_rejects_duplicate_feature() {
    let mut file: ProjectFile = serde_json::from_str(&saved_json()).unwrap();
    let first = file.features[0].clone();
    file.features.push(first);
    let json = serde_json::to_string(&file).unwrap();
    let result = load_project(&json, EngineConfig::default());
    assert!(matches!(result, Err(LoadError::DuplicateFeature { .. })));
}

#[test]
fn load_rejects_cyclic_connections() {
    let mut file: ProjectFile = serde_json::from_str(&saved_json()).unwrap();
    let back = file
        .connections
        .iter()
        .find(|c| c.roles.contains(&InputRole::Target))
        .cloned()
        .unwrap();
    file.connections.push(file_format::ConnectionEntry {
        parent: back.child,
        child: back.parent,
        roles: back.roles,
    });
    let json = serde_json::to_string(&file).unwrap();
    let result = load_project(&json, EngineConfig::default());
    assert!(matches!(result, Err(LoadError::InvalidConnection { .. })));
}

#[test]
fn metadata_touch_moves_modified_forward() {
    let mut meta = ProjectMetadata::new("Timestamps");
    let created = meta.created;
    meta.touch();
    assert!(meta.modified >= created);
    assert_eq!(meta.created, created);
}
