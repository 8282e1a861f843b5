use super::*;

// =============================================================================
// grid
// =============================================================================

#[test]
fn grid_orders_neighbors_up_left_right_down() {
    let cut = CutDescription::grid(3, 3, 60.0, 40.0).unwrap();
    assert_eq!(cut.len(), 9);
    assert_eq!(cut.connects[0], vec![1, 3]);
    assert_eq!(cut.connects[2], vec![1, 5]);
    assert_eq!(cut.connects[4], vec![1, 3, 5, 7]);
    assert_eq!(cut.connects[8], vec![5, 7]);
}

#[test]
fn grid_answers_are_row_major_cells() {
    let cut = CutDescription::grid(3, 2, 60.0, 40.0).unwrap();
    assert_eq!(cut.answers[0], Point::new(0.0, 0.0));
    assert_eq!(cut.answers[2], Point::new(120.0, 0.0));
    assert_eq!(cut.answers[4], Point::new(60.0, 40.0));
    assert!((cut.board_width - 180.0).abs() < f64::EPSILON);
    assert!((cut.board_height - 80.0).abs() < f64::EPSILON);
    assert_eq!(cut.margin, Point::new(180.0, 80.0));
}

#[test]
fn grid_rejects_zero_dimension() {
    assert!(matches!(CutDescription::grid(0, 3, 60.0, 60.0), Err(CutError::InvalidDimension(_))));
    assert!(matches!(CutDescription::grid(3, 3, 0.0, 60.0), Err(CutError::InvalidDimension(_))));
}

#[test]
fn grid_output_validates() {
    let cut = CutDescription::grid(5, 4, 50.0, 50.0).unwrap();
    assert_eq!(cut.validate(), Ok(()));
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn validate_catches_asymmetric_neighbors() {
    let mut cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    cut.connects[1].clear();
    assert_eq!(cut.validate(), Err(CutError::Asymmetric { a: 0, b: 1 }));
}

#[test]
fn validate_catches_out_of_range_neighbor() {
    let mut cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    cut.connects[0].push(9);
    assert_eq!(cut.validate(), Err(CutError::NeighborOutOfRange { piece: 0, neighbor: 9 }));
}

#[test]
fn validate_catches_length_mismatch() {
    let mut cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    cut.connects.pop();
    assert_eq!(cut.validate(), Err(CutError::LengthMismatch { answers: 2, connects: 1 }));
}

#[test]
fn validate_catches_self_neighbor() {
    let mut cut = CutDescription::grid(2, 1, 60.0, 60.0).unwrap();
    cut.connects[0].push(0);
    assert_eq!(cut.validate(), Err(CutError::SelfNeighbor(0)));
}

// =============================================================================
// derived values
// =============================================================================

#[test]
fn tolerance_is_fifth_of_larger_side() {
    let cut = CutDescription::grid(2, 2, 50.0, 80.0).unwrap();
    assert!((cut.tolerance() - 16.0).abs() < f64::EPSILON);
}

#[test]
fn layer_is_three_boards_wide() {
    let cut = CutDescription::grid(2, 2, 50.0, 80.0).unwrap();
    assert_eq!(cut.layer_bounds(), Point::new(300.0, 480.0));
}

#[test]
fn scatter_is_deterministic_per_seed() {
    let cut = CutDescription::grid(6, 5, 40.0, 40.0).unwrap();
    assert_eq!(cut.scatter(42), cut.scatter(42));
    assert_ne!(cut.scatter(42), cut.scatter(43));
}

#[test]
fn scatter_keeps_pieces_inside_layer_and_off_board() {
    let cut = CutDescription::grid(6, 5, 40.0, 40.0).unwrap();
    let bounds = cut.layer_bounds();
    let positions = cut.scatter(7);
    assert_eq!(positions.len(), 30);
    for pos in &positions {
        assert!(pos.x >= 0.0 && pos.x <= bounds.x);
        assert!(pos.y >= 0.0 && pos.y <= bounds.y);
        let on_board = pos.x > cut.margin.x
            && pos.x < cut.margin.x + cut.board_width - cut.piece_width
            && pos.y > cut.margin.y
            && pos.y < cut.margin.y + cut.board_height - cut.piece_height;
        assert!(!on_board, "piece scattered onto the board at {pos:?}");
    }
}

#[test]
fn scatter_uses_distinct_slots() {
    let cut = CutDescription::grid(4, 4, 40.0, 40.0).unwrap();
    let positions = cut.scatter(1);
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
