use super::*;

fn pair() -> PieceGraph {
    let cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    PieceGraph::new(&cut, &[Point::new(100.0, 100.0), Point::new(300.0, 20.0)])
        .unwrap()
        .with_tolerance(10.0)
}

fn row_of_three() -> PieceGraph {
    let cut = CutDescription::grid(3, 1, 60.0, 60.0).unwrap();
    PieceGraph::new(&cut, &[Point::new(10.0, 10.0), Point::new(200.0, 10.0), Point::new(400.0, 10.0)]).unwrap()
}

fn place(graph: &mut PieceGraph, id: PieceId, pos: Point) -> PutOutcome {
    let root = graph.pick_up(id, "alice").unwrap();
    let outcome = graph.put_down(root, pos).unwrap();
    graph.check_invariants().unwrap();
    outcome
}

// =============================================================================
// construction
// =============================================================================

#[test]
fn new_rejects_position_count_mismatch() {
    let cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    let err = PieceGraph::new(&cut, &[Point::default()]).unwrap_err();
    assert_eq!(err, GraphError::PositionCount { expected: 2, actual: 1 });
}

#[test]
fn new_takes_tolerance_and_bounds_from_cut() {
    let cut = CutDescription::grid(4, 2, 50.0, 70.0).unwrap();
    let graph = PieceGraph::scattered(&cut, 9).unwrap();
    assert!((graph.tolerance() - 14.0).abs() < f64::EPSILON);
    assert_eq!(graph.bounds(), Point::new(600.0, 420.0));
    assert_eq!(graph.len(), 8);
    assert_eq!(graph.fit_count(), 0);
}

// =============================================================================
// pick_up / move_to
// =============================================================================

#[test]
fn pick_up_child_marks_root() {
    let mut graph = row_of_three();
    graph.merge_groups(0, 2).unwrap();

    assert_eq!(graph.pick_up(2, "alice"), Ok(0));
    assert_eq!(graph.get(0).unwrap().holder(), Some("alice"));
    assert_eq!(graph.get(2).unwrap().holder(), None);
    graph.check_invariants().unwrap();
}

#[test]
fn pick_up_rejects_held_group() {
    let mut graph = pair();
    graph.pick_up(1, "alice").unwrap();
    assert_eq!(graph.pick_up(1, "bob"), Err(GraphError::AlreadyHeld { piece: 1, holder: "alice".into() }));
    assert_eq!(graph.holder_of(1), Some("alice"));
}

#[test]
fn pick_up_rejects_fit_group() {
    let mut graph = pair();
    graph.fit_to_board(0).unwrap();
    assert_eq!(graph.pick_up(0, "alice"), Err(GraphError::AlreadyFit(0)));
}

#[test]
fn pick_up_rejects_unknown_piece() {
    let mut graph = pair();
    assert_eq!(graph.pick_up(9, "alice"), Err(GraphError::UnknownPiece(9)));
}

#[test]
fn move_to_requires_holder() {
    let mut graph = pair();
    assert_eq!(graph.move_to(0, Point::new(5.0, 5.0)), Err(GraphError::NotHeld(0)));
}

#[test]
fn move_to_rejects_child() {
    let mut graph = row_of_three();
    graph.merge_groups(0, 1).unwrap();
    graph.pick_up(1, "alice").unwrap();
    assert_eq!(graph.move_to(1, Point::new(5.0, 5.0)), Err(GraphError::NotRoot(1)));
}

#[test]
fn children_follow_root_by_answer_offset() {
    let mut graph = row_of_three();
    graph.merge_groups(0, 2).unwrap();
    let root = graph.pick_up(0, "alice").unwrap();
    graph.move_to(root, Point::new(50.0, 70.0)).unwrap();

    assert_eq!(graph.world_position(0), Ok(Point::new(50.0, 70.0)));
    assert_eq!(graph.world_position(2), Ok(Point::new(170.0, 70.0)));
}

#[test]
fn positions_clamp_to_piece_layer() {
    let mut graph = pair();
    graph.pick_up(0, "alice").unwrap();
    let clamped = graph.move_to(0, Point::new(-40.0, 9000.0)).unwrap();
    assert_eq!(clamped, Point::new(0.0, 180.0));
}

// =============================================================================
// put_down
// =============================================================================

#[test]
fn put_down_within_tolerance_connects_lower_id_as_parent() {
    let mut graph = pair();
    let outcome = place(&mut graph, 1, Point::new(161.0, 101.0));

    assert_eq!(outcome, PutOutcome::Connected { parent: 0, child: 1 });
    assert_eq!(graph.get(1).unwrap().parent(), Some(0));
    assert_eq!(graph.get(0).unwrap().children(), &[1]);
    assert_eq!(graph.fit_count(), 1);
}

#[test]
fn put_down_outside_tolerance_does_nothing() {
    let mut graph = pair();
    let outcome = place(&mut graph, 1, Point::new(180.0, 101.0));

    assert_eq!(outcome, PutOutcome::Nothing);
    assert!(graph.get(1).unwrap().is_root());
    assert_eq!(graph.holder_of(1), None);
    assert_eq!(graph.world_position(1), Ok(Point::new(180.0, 101.0)));
    assert_eq!(graph.fit_count(), 0);
}

#[test]
fn put_down_prefers_connection_over_board_fit() {
    let cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    // Piece 0 already sits exactly on its board slot but is not fit.
    let mut graph = PieceGraph::new(&cut, &[Point::new(120.0, 60.0), Point::new(10.0, 10.0)]).unwrap();

    // Piece 1 lands on its board slot and next to piece 0: both snaps apply.
    let outcome = place(&mut graph, 1, Point::new(180.0, 60.0));

    assert_eq!(outcome, PutOutcome::Connected { parent: 0, child: 1 });
    assert!(!graph.get(0).unwrap().is_fit());
    assert!(!graph.get(1).unwrap().is_fit());
    assert_eq!(graph.fit_count(), 1);
}

#[test]
fn put_down_near_board_slot_fits_group() {
    let mut graph = pair();
    let outcome = place(&mut graph, 0, Point::new(125.0, 57.0));

    assert_eq!(outcome, PutOutcome::Fit { piece: 0 });
    assert!(graph.get(0).unwrap().is_fit());
    assert_eq!(graph.world_position(0), Ok(Point::new(120.0, 60.0)));
    assert_eq!(graph.fit_count(), 1);
}

#[test]
fn put_down_rejects_fit_group() {
    let mut graph = pair();
    graph.fit_to_board(1).unwrap();
    assert_eq!(graph.put_down(1, Point::new(0.0, 0.0)), Err(GraphError::AlreadyFit(1)));
}

#[test]
fn fit_count_reaches_total_exactly_on_completion() {
    let cut = CutDescription::grid(2, 2, 60.0, 60.0).unwrap();
    let far = [Point::new(10.0, 10.0), Point::new(300.0, 10.0), Point::new(10.0, 300.0), Point::new(300.0, 300.0)];
    let mut graph = PieceGraph::new(&cut, &far).unwrap();
    let margin = graph.margin();

    // Build the top row, then the bottom row, then join the rows.
    place(&mut graph, 1, Point::new(70.0, 10.0));
    place(&mut graph, 3, Point::new(70.0, 300.0));
    assert_eq!(graph.fit_count(), 2);
    assert!(!graph.is_complete());
    place(&mut graph, 2, Point::new(10.0, 70.0));
    assert_eq!(graph.fit_count(), 3);
    assert!(!graph.is_complete());

    assert_eq!(place(&mut graph, 3, margin), PutOutcome::Fit { piece: 0 });
    assert_eq!(graph.fit_count(), 4);
    assert!(graph.is_complete());
    assert!(graph.pieces().iter().all(Piece::is_fit));
}

// =============================================================================
// merge_groups
// =============================================================================

#[test]
fn merge_flattens_losing_group_onto_new_root() {
    let mut graph = row_of_three();
    graph.merge_groups(1, 2).unwrap();
    graph.merge_groups(0, 1).unwrap();

    assert_eq!(graph.get(2).unwrap().parent(), Some(0));
    assert_eq!(graph.get(1).unwrap().parent(), Some(0));
    assert!(graph.get(1).unwrap().children().is_empty());
    assert_eq!(graph.get(0).unwrap().children(), &[1, 2]);
    for id in 0..3 {
        assert_eq!(graph.root_of(id), Ok(0));
    }
    graph.check_invariants().unwrap();
}

#[test]
fn merge_rejects_non_root_and_same_group() {
    let mut graph = row_of_three();
    graph.merge_groups(0, 1).unwrap();

    assert_eq!(graph.merge_groups(1, 2), Err(GraphError::NotRoot(1)));
    assert_eq!(graph.merge_groups(0, 0), Err(GraphError::SameGroup(0, 0)));
    assert_eq!(graph.fit_count(), 1);
    graph.check_invariants().unwrap();
}

#[test]
fn merge_clears_holders() {
    let mut graph = row_of_three();
    graph.pick_up(2, "bob").unwrap();
    graph.merge_groups(0, 2).unwrap();
    assert_eq!(graph.holder_of(2), None);
    graph.check_invariants().unwrap();
}

// =============================================================================
// fit_to_board
// =============================================================================

#[test]
fn fit_propagates_to_descendants_and_is_idempotent() {
    let mut graph = row_of_three();
    graph.merge_groups(0, 1).unwrap();
    graph.pick_up(0, "alice").unwrap();

    assert_eq!(graph.fit_to_board(1), Ok(true));
    assert!(graph.get(0).unwrap().is_fit());
    assert!(graph.get(1).unwrap().is_fit());
    assert!(!graph.get(2).unwrap().is_fit());
    assert_eq!(graph.holder_of(0), None);
    assert_eq!(graph.fit_count(), 2);

    assert_eq!(graph.fit_to_board(0), Ok(false));
    assert_eq!(graph.fit_count(), 2);
    assert!(graph.get(0).unwrap().is_fit());
    graph.check_invariants().unwrap();
}

#[test]
fn fit_group_cannot_be_held_again() {
    let mut graph = pair();
    graph.fit_to_board(0).unwrap();
    assert_eq!(graph.set_holder(0, Some("alice".into())), Err(GraphError::AlreadyFit(0)));
    assert_eq!(graph.pick_up(0, "alice"), Err(GraphError::AlreadyFit(0)));
    assert!(graph.get(0).unwrap().is_fit());
}

// =============================================================================
// snapshot / restore
// =============================================================================

#[test]
fn restore_reproduces_graph_state() {
    let mut source = row_of_three();
    source.merge_groups(0, 2).unwrap();
    source.pick_up(1, "carol").unwrap();
    source.move_to(1, Point::new(33.0, 44.0)).unwrap();

    let mut mirror = row_of_three();
    mirror.restore(&source.snapshot(), source.fit_count()).unwrap();

    assert_eq!(mirror.pieces(), source.pieces());
    assert_eq!(mirror.fit_count(), 1);
}

#[test]
fn restore_rejects_malformed_snapshot_and_keeps_state() {
    let mut graph = row_of_three();
    let mut snapshot = graph.snapshot();
    snapshot[1].parent = Some(2);

    assert!(matches!(graph.restore(&snapshot, 0), Err(GraphError::Invariant(_))));
    assert!(graph.get(1).unwrap().is_root());
}
