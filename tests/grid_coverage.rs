// ==============================================
// GRID COVERAGE TESTS (integration)
// ==============================================
//
// Every element of the virtual array belongs to exactly one cell, and the
// cells of a grid tile the array without gaps or overlap.

use cellcache::grid::CellGrid;

fn assert_tiles(dims: &[u64], cells: &[u32]) {
    let grid = CellGrid::try_new(dims, cells).unwrap();
    let total: u64 = dims.iter().product();

    let mut covered = 0u64;
    for key in 0..grid.num_cells() {
        let bounds = grid.bounds(key).unwrap();
        covered += bounds.element_count() as u64;
        for other in (key + 1)..grid.num_cells() {
            let other_bounds = grid.bounds(other).unwrap();
            assert!(
                !bounds.intersects(&other_bounds),
                "cells {key} and {other} overlap in {dims:?}/{cells:?}"
            );
        }
    }
    assert_eq!(covered, total, "cells of {dims:?}/{cells:?} do not cover the array");
}

#[test]
fn cells_tile_evenly_divisible_arrays() {
    assert_tiles(&[8], &[4]);
    assert_tiles(&[8, 6], &[4, 3]);
    assert_tiles(&[4, 4, 4], &[2, 2, 2]);
}

#[test]
fn cells_tile_arrays_with_truncated_edges() {
    assert_tiles(&[10], &[4]);
    assert_tiles(&[7, 5], &[3, 2]);
    assert_tiles(&[5, 5, 3], &[2, 4, 2]);
}

#[test]
fn every_element_maps_into_its_cell() {
    let grid = CellGrid::try_new(&[9, 7], &[4, 3]).unwrap();
    for x in 0..9u64 {
        for y in 0..7u64 {
            let key = grid.key_for_element(&[x, y]).unwrap();
            assert!(grid.bounds(key).unwrap().contains(&[x, y]), "({x}, {y}) not in cell {key}");
        }
    }
    assert!(grid.key_for_element(&[9, 0]).is_err());
    assert!(grid.key_for_element(&[0, 7]).is_err());
}

#[test]
fn truncated_edge_cells_are_smaller() {
    let grid = CellGrid::try_new(&[10, 10], &[4, 4]).unwrap();
    assert_eq!(grid.grid_dimensions(), &[3, 3]);
    let corner = grid.key_for_grid_position(&[2, 2]).unwrap();
    assert_eq!(grid.cell_size(corner).unwrap(), vec![2, 2]);
    assert!(grid.is_truncated(corner).unwrap());
    assert!(!grid.is_truncated(0).unwrap());
}

#[test]
fn large_volume_has_one_thousand_cells() {
    let grid = CellGrid::try_new(&[640, 640, 640], &[64, 64, 64]).unwrap();
    assert_eq!(grid.num_cells(), 1000);
    assert_eq!(grid.nominal_cell_element_count(), 64 * 64 * 64);

    let last = grid.key_for_element(&[639, 639, 639]).unwrap();
    assert_eq!(last, 999);
    assert_eq!(grid.cell_min(last).unwrap(), vec![576, 576, 576]);
    assert_eq!(grid.cell_grid_position(last).unwrap(), vec![9, 9, 9]);
}

#[test]
fn keys_and_grid_positions_are_inverse() {
    let grid = CellGrid::try_new(&[30, 20, 10], &[7, 6, 5]).unwrap();
    for key in 0..grid.num_cells() {
        let pos = grid.cell_grid_position(key).unwrap();
        assert_eq!(grid.key_for_grid_position(&pos).unwrap(), key);
    }
    assert!(grid.cell_grid_position(grid.num_cells()).is_err());
}
