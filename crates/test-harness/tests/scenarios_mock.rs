//! End-to-end identity scenarios against MockKernel.
//!
//! Each scenario builds a model through ModelBuilder, edits it, and checks
//! that shape ids behave: complete, unique, stable under recompute, and
//! traceable through history when shapes go away.

use std::collections::BTreeSet;

use feature_engine::{EngineError, FeatureKind};
use geom_kernel::ShapeKind;
use seer_types::InputRole;
use shape_identity::{
    DiagnosticKind, IntersectionMapper, Pick, PickResolution, ShapeHistory, SplitFaceRecord,
};
use test_harness::assertions::{assert_diagnostic_count, assert_ids_stable};
use test_harness::helpers::id_snapshot;
use test_harness::{init_tracing, HarnessError, ModelBuilder};
use uuid::Uuid;

const SPACING: [f64; 3] = [3.0, 0.0, 0.0];

fn pattern_kind(count: usize) -> FeatureKind {
    FeatureKind::Instance {
        count,
        spacing: SPACING,
    }
}

/// Box → Pattern(3) → Chamfer, plus Box → Offset and a Union with a second box.
fn composite() -> Result<ModelBuilder, HarnessError> {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 2.0, 2.0, 2.0)?;
    m.add_box("tool", 1.0, 1.0, 1.0)?;
    m.instance("pattern", "box", 3, SPACING)?;
    let edge = m.first_edge_of_child("pattern", 1)?;
    m.chamfer("chamfer", "pattern", 0.2, &[edge])?;
    m.offset("offset", "box", 0.5)?;
    m.boolean_union("union", "box", "tool")?;
    Ok(m)
}

// ── Scenario 1: Every shape has exactly one id ──────────────────────────

#[test]
fn composite_model_is_fully_identified() {
    init_tracing();
    let m = composite().unwrap();
    m.assert_no_errors().unwrap();
    m.assert_identity_clean().unwrap();
    assert_eq!(m.feature_count(), 6);
}

// ── Scenario 2: Idempotence ─────────────────────────────────────────────

#[test]
fn recompute_with_identical_inputs_is_idempotent() {
    init_tracing();
    let mut m = composite().unwrap();
    let before = id_snapshot(&m.engine);

    m.touch("box").unwrap();
    m.touch("tool").unwrap();
    assert_eq!(id_snapshot(&m.engine), before);

    // Twice more, to rule out drift.
    m.touch("box").unwrap();
    m.touch("box").unwrap();
    assert_eq!(id_snapshot(&m.engine), before);
    m.assert_identity_clean().unwrap();
}

// ── Scenario 3: Unchanged shapes keep their ids ─────────────────────────

#[test]
fn untouched_faces_keep_input_ids_through_chamfer() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    let edge = m.ids_of_kind("box", ShapeKind::Edge).unwrap()[0];
    m.chamfer("chamfer", "box", 0.1, &[edge]).unwrap();

    let box_table = m.table("box").unwrap();
    let chamfer_table = m.table("chamfer").unwrap();
    let top = m.tag_id("box", "top").unwrap();
    assert_eq!(chamfer_table.get_shape(top), box_table.get_shape(top));

    // Touched faces are rebuilt but keep their ids too.
    let bottom = m.tag_id("box", "bottom").unwrap();
    assert!(chamfer_table.has_id(bottom));
    assert_ne!(chamfer_table.get_shape(bottom), box_table.get_shape(bottom));

    // One new face for the chamfered edge, traced back to it.
    let box_faces: BTreeSet<Uuid> = m.ids_of_kind("box", ShapeKind::Face).unwrap().into_iter().collect();
    let new_faces: Vec<Uuid> = m
        .ids_of_kind("chamfer", ShapeKind::Face)
        .unwrap()
        .into_iter()
        .filter(|id| !box_faces.contains(id))
        .collect();
    assert_eq!(new_faces.len(), 1);
    let chamfer_id = m.feature_id("chamfer").unwrap();
    let box_id = m.feature_id("box").unwrap();
    assert_eq!(m.engine.history.feature_of(new_faces[0]), Some(chamfer_id));
    assert_eq!(m.engine.history.devolve(box_id, new_faces[0]), Some(edge));
}

#[test]
fn offset_keeps_every_input_id() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    m.offset("offset", "box", 0.25).unwrap();
    assert_ids_stable(&m.ids("box").unwrap(), &m.ids("offset").unwrap(), "offset").unwrap();
}

// ── Scenario 4: Splits are stable ───────────────────────────────────────

#[test]
fn pattern_copies_keep_ids_across_recomputes() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    m.instance("pattern", "box", 3, SPACING).unwrap();
    let first = m.ids("pattern").unwrap();
    // Original plus two copies of 34 shapes, and the compound.
    assert_eq!(first.len(), 1 + 3 * 34);

    m.touch("box").unwrap();
    assert_ids_stable(&first, &m.ids("pattern").unwrap(), "touch").unwrap();

    m.edit("pattern", pattern_kind(2)).unwrap();
    let shrunk = m.ids("pattern").unwrap();
    assert_eq!(shrunk.len(), 1 + 2 * 34);
    assert!(shrunk.iter().all(|id| first.contains(id)));

    m.edit("pattern", pattern_kind(3)).unwrap();
    assert_ids_stable(&first, &m.ids("pattern").unwrap(), "grow back").unwrap();
}

// ── Scenario 5: Weak-match tie-break ────────────────────────────────────

#[test]
fn weak_match_tie_goes_to_earliest_registered() {
    let id = |n: u128| Uuid::from_u128(n);
    let edges = |ns: &[u128]| ns.iter().map(|n| id(*n)).collect::<BTreeSet<_>>();
    let mut mapper = IntersectionMapper::new();
    for (face_id, es) in [(100, &[1, 2, 3, 9][..]), (101, &[1, 2, 3, 8]), (102, &[1, 7])] {
        mapper.register_split_face(SplitFaceRecord {
            source_face: id(50),
            edges: edges(es),
            face_id: id(face_id),
            wire_id: id(face_id + 100),
        });
    }

    let query = edges(&[1, 2, 3]);
    for _ in 0..10 {
        assert_eq!(mapper.weak_match(id(50), &query, &[]), Some(0));
    }
    // Once the first is taken the second size-3 candidate wins.
    assert_eq!(mapper.weak_match(id(50), &query, &[true]), Some(1));
}

// ── Scenario 6: History resolution across a pruned ancestor ─────────────

#[test]
fn resolve_histories_skips_pruned_ancestor() {
    let (f1, f2, f3) = (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3));
    let (a, b, c) = (Uuid::from_u128(10), Uuid::from_u128(20), Uuid::from_u128(30));

    // The pick saw the whole chain A → B → C.
    let mut pick_history = ShapeHistory::new();
    pick_history.add_shape(f1, a);
    pick_history.add_shape(f2, b);
    pick_history.add_shape(f3, c);
    pick_history.add_connection(a, b).unwrap();
    pick_history.add_connection(b, c).unwrap();

    // The live graph no longer has A.
    let mut live = ShapeHistory::new();
    live.add_shape(f2, b);
    live.add_shape(f3, c);
    live.add_connection(b, c).unwrap();

    assert_eq!(live.resolve_histories(&pick_history, f3), vec![c]);
    assert!(live.resolve_histories(&pick_history, f1).is_empty());

    // A history sharing nothing with the live graph resolves to nothing.
    let mut unrelated = ShapeHistory::new();
    unrelated.add_shape(f1, Uuid::from_u128(99));
    assert!(live.resolve_histories(&unrelated, f3).is_empty());
}

// ── Scenario 7: Primitive tags are stable ───────────────────────────────

#[test]
fn box_tag_ids_survive_recompute_and_edit() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    let tags: Vec<Uuid> = m.feature("box").unwrap().tags.iter().map(|t| t.id).collect();
    assert_eq!(tags.len(), 8);
    let table = m.table("box").unwrap();
    assert!(tags.iter().all(|id| table.has_id(*id)));
    let first = m.ids("box").unwrap();

    m.touch("box").unwrap();
    assert_ids_stable(&first, &m.ids("box").unwrap(), "recompute").unwrap();

    m.edit(
        "box",
        FeatureKind::Box {
            length: 4.0,
            width: 1.0,
            height: 1.0,
        },
    )
    .unwrap();
    assert_ids_stable(&first, &m.ids("box").unwrap(), "edit").unwrap();
}

// ── Scenario 8: Boolean split faces share the intersection edge ─────────

#[test]
fn subtract_split_faces_reference_one_intersection_edge() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("block", 4.0, 4.0, 4.0).unwrap();
    m.add_box("cutter", 1.0, 1.0, 1.0).unwrap();
    m.boolean_subtract("cut", "block", "cutter").unwrap();

    let feature = m.feature("cut").unwrap();
    let edges = feature.mapper.edge_records();
    assert_eq!(edges.len(), 1);
    let edge_id = edges[0].id;
    assert!(feature.table.has_id(edge_id));
    let expected_faces: BTreeSet<Uuid> = [
        m.tag_id("block", "bottom").unwrap(),
        m.tag_id("cutter", "bottom").unwrap(),
    ]
    .into_iter()
    .collect();
    assert_eq!(edges[0].faces, expected_faces);

    let bottom = m.tag_id("block", "bottom").unwrap();
    let pieces: Vec<&SplitFaceRecord> = feature
        .mapper
        .split_face_records()
        .iter()
        .filter(|s| s.source_face == bottom)
        .collect();
    assert_eq!(pieces.len(), 2);
    assert!(pieces.iter().all(|p| p.edges.contains(&edge_id)));
    assert_ne!(pieces[0].face_id, pieces[1].face_id);

    let before = m.ids("cut").unwrap();
    m.touch("block").unwrap();
    assert_ids_stable(&before, &m.ids("cut").unwrap(), "subtract").unwrap();
}

#[test]
fn second_contact_keeps_split_face_ids_by_shared_edge() {
    init_tracing();
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("block", 4.0, 4.0, 4.0).unwrap();
    m.add_box("cutter", 1.0, 1.0, 1.0).unwrap();
    m.boolean_subtract("cut", "block", "cutter").unwrap();

    let bottom = m.tag_id("block", "bottom").unwrap();
    let pieces_of = |m: &ModelBuilder| -> Vec<SplitFaceRecord> {
        m.feature("cut")
            .unwrap()
            .mapper
            .split_face_records()
            .iter()
            .filter(|s| s.source_face == bottom)
            .cloned()
            .collect()
    };
    let before = pieces_of(&m);
    assert_eq!(before.len(), 2);
    let first_edge = m.feature("cut").unwrap().mapper.edge_records()[0].id;
    let face_ids_before = m.ids_of_kind("cut", ShapeKind::Face).unwrap();

    // A second cutter face now meets the bottom: the second piece gains an
    // edge, so only a partial edge-set match can keep its id.
    m.kernel_mut().set_boolean_contacts(2);
    m.touch("cut").unwrap();

    let feature = m.feature("cut").unwrap();
    assert_eq!(feature.mapper.edge_records().len(), 2);
    let second_edge = feature
        .mapper
        .edge_records()
        .iter()
        .map(|e| e.id)
        .find(|id| *id != first_edge)
        .unwrap();
    let after = pieces_of(&m);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].face_id, before[0].face_id);
    assert_eq!(after[1].face_id, before[1].face_id);
    assert_eq!(after[1].wire_id, before[1].wire_id);
    let grown: BTreeSet<Uuid> = [first_edge, second_edge].into_iter().collect();
    assert_eq!(after[1].edges, grown);
    assert!(feature.table.has_id(after[1].face_id));

    let face_ids_after = m.ids_of_kind("cut", ShapeKind::Face).unwrap();
    assert!(face_ids_before.iter().all(|id| face_ids_after.contains(id)));
    m.assert_identity_clean().unwrap();

    // Back to one contact: the edge set shrinks and the id still holds.
    m.kernel_mut().set_boolean_contacts(1);
    m.touch("cut").unwrap();
    let shrunk = pieces_of(&m);
    assert_eq!(shrunk[1].face_id, before[1].face_id);
    assert_eq!(shrunk[1].edges, BTreeSet::from([first_edge]));
    assert_eq!(
        m.ids_of_kind("cut", ShapeKind::Face).unwrap(),
        face_ids_before
    );
}

#[test]
fn repeated_face_pair_is_reported_once() {
    init_tracing();
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("block", 4.0, 4.0, 4.0).unwrap();
    m.add_box("cutter", 1.0, 1.0, 1.0).unwrap();
    m.kernel_mut().set_doubled_section(true);
    m.boolean_union("joined", "block", "cutter").unwrap();

    assert_diagnostic_count(
        m.diagnostics(),
        DiagnosticKind::AmbiguousIntersection,
        1,
        "doubled section",
    )
    .unwrap();
    let feature = m.feature("joined").unwrap();
    assert_eq!(feature.mapper.edge_records().len(), 1);
    m.assert_no_errors().unwrap();
    m.assert_identity_clean().unwrap();

    m.kernel_mut().set_doubled_section(false);
    m.touch("joined").unwrap();
    assert_diagnostic_count(
        m.diagnostics(),
        DiagnosticKind::AmbiguousIntersection,
        0,
        "single section",
    )
    .unwrap();
}

// ── Scenario 9: Pick falls back to a surviving sibling ──────────────────

#[test]
fn pick_on_removed_copy_resolves_to_sibling() {
    init_tracing();
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    m.instance("pattern", "box", 3, SPACING).unwrap();
    let e0 = m.first_edge_of_child("pattern", 0).unwrap();
    let e1 = m.first_edge_of_child("pattern", 1).unwrap();
    let e2 = m.first_edge_of_child("pattern", 2).unwrap();
    m.chamfer("chamfer", "pattern", 0.1, &[e2]).unwrap();
    let pick = match &m.feature("chamfer").unwrap().kind {
        FeatureKind::Chamfer { edges, .. } => edges[0].clone(),
        other => panic!("unexpected kind {other:?}"),
    };
    assert_eq!(m.resolve(&pick), PickResolution::Resolved(e2));

    m.edit("pattern", pattern_kind(2)).unwrap();
    assert_eq!(m.resolve(&pick), PickResolution::Stale(vec![e0, e1]));
    m.assert_no_errors().unwrap();
    assert_diagnostic_count(m.diagnostics(), DiagnosticKind::UnresolvedPick, 0, "sibling").unwrap();
    assert!(!m.feature("chamfer").unwrap().state.failed);
}

#[test]
fn lost_pick_is_skipped_with_warning() {
    let mut m = ModelBuilder::mock();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    let edge = m.ids_of_kind("box", ShapeKind::Edge).unwrap()[3];
    m.chamfer("chamfer", "box", 0.1, &[edge]).unwrap();

    let box_id = m.feature_id("box").unwrap();
    let live = m.pick("box", edge).unwrap();
    let lost = Pick {
        feature_id: box_id,
        shape_id: Uuid::from_u128(0xdead),
        kind: ShapeKind::Edge,
        history: ShapeHistory::new(),
    };
    m.edit(
        "chamfer",
        FeatureKind::Chamfer {
            distance: 0.1,
            edges: vec![lost, live],
        },
    )
    .unwrap();

    m.assert_no_errors().unwrap();
    assert_diagnostic_count(m.diagnostics(), DiagnosticKind::UnresolvedPick, 1, "lost").unwrap();
}

// ── Scenario 10: Cycles are rejected before mutation ────────────────────

#[test]
fn connecting_back_edge_is_rejected() {
    let mut m = ModelBuilder::mock();
    m.add_box("a", 1.0, 1.0, 1.0).unwrap();
    m.offset("b", "a", 0.5).unwrap();
    let before = m.engine.graph.connections();

    let result = m.connect("b", "a", InputRole::Target);
    assert!(matches!(
        result,
        Err(HarnessError::Engine(EngineError::CycleDetected { .. }))
    ));
    assert_eq!(m.engine.graph.connections(), before);
    assert_diagnostic_count(m.diagnostics(), DiagnosticKind::CycleRejected, 1, "cycle").unwrap();
}

// ── Failures ────────────────────────────────────────────────────────────

#[test]
fn kernel_failure_keeps_dependents_usable() {
    let mut m = ModelBuilder::mock();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    m.offset("offset", "box", 0.5).unwrap();
    let offset_ids = m.ids("offset").unwrap();

    m.edit("offset", FeatureKind::Offset { distance: 0.0 }).unwrap();
    m.assert_has_errors().unwrap();
    assert!(m.feature("offset").unwrap().state.failed);
    assert_ids_stable(&offset_ids, &m.ids("offset").unwrap(), "failed offset").unwrap();
    assert_diagnostic_count(
        m.diagnostics(),
        DiagnosticKind::GeometryKernelFailure,
        1,
        "zero offset",
    )
    .unwrap();

    m.edit("offset", FeatureKind::Offset { distance: 0.75 }).unwrap();
    m.assert_no_errors().unwrap();
    assert_ids_stable(&offset_ids, &m.ids("offset").unwrap(), "recovered offset").unwrap();
}

#[test]
fn skipped_pattern_passes_box_through() {
    let mut m = ModelBuilder::mock().with_auto_check();
    m.add_box("box", 1.0, 1.0, 1.0).unwrap();
    m.instance("pattern", "box", 2, SPACING).unwrap();
    m.skip("pattern", true).unwrap();
    assert_ids_stable(&m.ids("box").unwrap(), &m.ids("pattern").unwrap(), "skipped").unwrap();

    m.skip("pattern", false).unwrap();
    assert_eq!(m.ids("pattern").unwrap().len(), 1 + 2 * 34);
}
