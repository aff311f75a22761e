use tracing::debug;

use crate::entity::Movable;

use super::grid::{GridPos, OccupancyGrid, WALKABLE};

/// A* over an occupancy grid with a temporary ignore list.
///
/// Ignored entities have their occupied cell marked walkable while searching.
/// The marks stay applied across searches until `clear_ignore_list` restores
/// the exact prior cell values.
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    pending_ignores: Vec<GridPos>,
    restore_log: Vec<(usize, u8)>,
}

impl Pathfinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(&mut self, entity: &dyn Movable) {
        let cell = entity.occupied_cell();
        if !self.pending_ignores.contains(&cell) {
            self.pending_ignores.push(cell);
        }
    }

    pub fn ignored_count(&self) -> usize {
        self.pending_ignores.len()
    }

    pub fn find_path(
        &mut self,
        grid: &mut OccupancyGrid,
        entity: &dyn Movable,
        goal: GridPos,
        allow_incomplete: bool,
    ) -> Vec<GridPos> {
        self.apply_ignore_list(grid);
        let start = entity.grid_position();

        if let Some(path) = search(grid, start, goal) {
            return path;
        }
        if !allow_incomplete {
            return Vec::new();
        }
        let path = incomplete_path(grid, start, goal);
        debug!(
            start_x = start.x,
            start_y = start.y,
            goal_x = goal.x,
            goal_y = goal.y,
            path_len = path.len(),
            "incomplete_path_computed"
        );
        path
    }

    pub fn clear_ignore_list(&mut self, grid: &mut OccupancyGrid) {
        for (index, value) in self.restore_log.drain(..).rev() {
            let pos = grid.position_of(index);
            grid.set_cell(pos, value);
        }
        self.pending_ignores.clear();
    }

    fn apply_ignore_list(&mut self, grid: &mut OccupancyGrid) {
        for cell in &self.pending_ignores {
            let Some(index) = grid.index_of(*cell) else {
                continue;
            };
            if self.restore_log.iter().any(|(logged, _)| *logged == index) {
                continue;
            }
            let Some(previous) = grid.cell(*cell) else {
                continue;
            };
            self.restore_log.push((index, previous));
            grid.set_cell(*cell, WALKABLE);
        }
    }
}

/// Walks the obstacle-free ideal path backward from the goal and returns the
/// real path to the first candidate that is actually reachable.
fn incomplete_path(grid: &OccupancyGrid, start: GridPos, goal: GridPos) -> Vec<GridPos> {
    let blank = OccupancyGrid::open(grid.width().max(0) as u32, grid.height().max(0) as u32);
    let Some(ideal) = search(&blank, start, goal) else {
        return Vec::new();
    };

    for candidate in ideal.iter().skip(1).rev() {
        if !grid.is_walkable(*candidate) {
            continue;
        }
        if let Some(path) = search(grid, start, *candidate) {
            return path;
        }
    }
    Vec::new()
}

fn search(grid: &OccupancyGrid, start: GridPos, goal: GridPos) -> Option<Vec<GridPos>> {
    let start_index = grid.index_of(start)?;
    let goal_index = grid.index_of(goal)?;
    if !grid.is_walkable(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let node_count = grid.width() as usize * grid.height() as usize;
    let mut closed = vec![false; node_count];
    let mut best_g = vec![u32::MAX; node_count];
    let mut parent = vec![None::<usize>; node_count];
    let mut open = Vec::new();
    let mut next_insertion = 0u64;

    let start_h = start.manhattan_distance(goal) as u32;
    open.push(OpenNode {
        pos: start,
        h_cost: start_h,
        f_cost: start_h,
        insertion_order: next_insertion,
    });
    next_insertion = next_insertion.saturating_add(1);
    best_g[start_index] = 0;

    while !open.is_empty() {
        let best_index = pick_best_open_node_index(&open);
        let current = open.swap_remove(best_index);
        let Some(current_index) = grid.index_of(current.pos) else {
            continue;
        };
        if closed[current_index] {
            continue;
        }
        closed[current_index] = true;

        if current.pos == goal {
            return reconstruct_path(grid, &parent, start_index, goal_index);
        }

        let current_g = best_g[current_index];
        for neighbor in grid.neighbors(current.pos) {
            let Some(neighbor_index) = grid.index_of(neighbor) else {
                continue;
            };
            if closed[neighbor_index] || !grid.is_walkable(neighbor) {
                continue;
            }

            let tentative_g = current_g.saturating_add(1);
            if tentative_g >= best_g[neighbor_index] {
                continue;
            }

            best_g[neighbor_index] = tentative_g;
            parent[neighbor_index] = Some(current_index);
            let h_cost = neighbor.manhattan_distance(goal) as u32;
            open.push(OpenNode {
                pos: neighbor,
                h_cost,
                f_cost: tentative_g.saturating_add(h_cost),
                insertion_order: next_insertion,
            });
            next_insertion = next_insertion.saturating_add(1);
        }
    }

    None
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    pos: GridPos,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, i32, i32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.pos.y,
        node.pos.x,
        node.insertion_order,
    )
}

fn reconstruct_path(
    grid: &OccupancyGrid,
    parent: &[Option<usize>],
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<GridPos>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        let next = parent.get(cursor).and_then(|value| *value)?;
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    Some(
        indices
            .into_iter()
            .map(|index| grid.position_of(index))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::grid::BLOCKED;

    struct Probe {
        cell: GridPos,
        next: Option<GridPos>,
    }

    impl Movable for Probe {
        fn grid_position(&self) -> GridPos {
            self.cell
        }

        fn is_moving(&self) -> bool {
            self.next.is_some()
        }

        fn next_cell(&self) -> Option<GridPos> {
            self.next
        }
    }

    fn at(x: i32, y: i32) -> Probe {
        Probe {
            cell: GridPos::new(x, y),
            next: None,
        }
    }

    #[test]
    fn open_grid_path_runs_along_x_axis() {
        let mut grid = OccupancyGrid::open(8, 5);
        let mut pathfinder = Pathfinder::new();

        let path = pathfinder.find_path(&mut grid, &at(0, 0), GridPos::new(5, 0), false);

        let expected: Vec<GridPos> = (0..=5).map(|x| GridPos::new(x, 0)).collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn start_equal_goal_is_single_cell() {
        let mut grid = OccupancyGrid::open(3, 3);
        let mut pathfinder = Pathfinder::new();

        let path = pathfinder.find_path(&mut grid, &at(1, 1), GridPos::new(1, 1), false);

        assert_eq!(path, vec![GridPos::new(1, 1)]);
    }

    #[test]
    fn out_of_bounds_and_degenerate_grids_yield_empty_paths() {
        let mut grid = OccupancyGrid::open(4, 4);
        let mut empty = OccupancyGrid::open(0, 0);
        let mut pathfinder = Pathfinder::new();

        assert!(pathfinder
            .find_path(&mut grid, &at(0, 0), GridPos::new(9, 0), true)
            .is_empty());
        assert!(pathfinder
            .find_path(&mut grid, &at(0, 0), GridPos::new(-1, 2), true)
            .is_empty());
        assert!(pathfinder
            .find_path(&mut empty, &at(0, 0), GridPos::new(0, 0), true)
            .is_empty());
    }

    #[test]
    fn path_routes_around_walls() {
        let mut grid = OccupancyGrid::from_rows(&["....", ".##.", "...."]).expect("grid");
        let mut pathfinder = Pathfinder::new();

        let path = pathfinder.find_path(&mut grid, &at(0, 1), GridPos::new(3, 1), false);

        assert_eq!(path.first(), Some(&GridPos::new(0, 1)));
        assert_eq!(path.last(), Some(&GridPos::new(3, 1)));
        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|cell| grid.is_walkable(*cell)));
    }

    #[test]
    fn enclosed_goal_falls_back_to_closest_reachable_cell() {
        let mut grid = OccupancyGrid::from_rows(&[
            ".......", //
            "....###", //
            "....#.#", //
            "....###", //
        ])
        .expect("grid");
        let start = GridPos::new(0, 2);
        let goal = GridPos::new(5, 2);
        let mut pathfinder = Pathfinder::new();

        assert!(pathfinder
            .find_path(&mut grid, &at(start.x, start.y), goal, false)
            .is_empty());
        let path = pathfinder.find_path(&mut grid, &at(start.x, start.y), goal, true);

        let end = *path.last().expect("non-empty fallback");
        assert!(grid.is_walkable(end));
        assert!(end.manhattan_distance(goal) < start.manhattan_distance(goal));
        assert_eq!(end, GridPos::new(3, 2));
    }

    #[test]
    fn fully_walled_start_has_no_fallback() {
        let mut grid = OccupancyGrid::from_rows(&["###", "#.#", "###", "..."]).expect("grid");
        let mut pathfinder = Pathfinder::new();

        let path = pathfinder.find_path(&mut grid, &at(1, 1), GridPos::new(1, 3), true);

        assert!(path.is_empty());
    }

    #[test]
    fn ignore_list_opens_cells_until_cleared_bit_for_bit() {
        let mut grid = OccupancyGrid::from_rows(&["...", "...", "..."]).expect("grid");
        grid.set_cell(GridPos::new(1, 0), BLOCKED);
        grid.set_cell(GridPos::new(2, 2), BLOCKED);
        let before = grid.clone();
        let blocker = Probe {
            cell: GridPos::new(2, 1),
            next: Some(GridPos::new(2, 2)),
        };
        let mut pathfinder = Pathfinder::new();
        pathfinder.ignore(&blocker);
        pathfinder.ignore(&at(1, 0));

        let path = pathfinder.find_path(&mut grid, &at(0, 0), GridPos::new(2, 2), false);
        assert_eq!(path.last(), Some(&GridPos::new(2, 2)));
        assert!(grid.is_walkable(GridPos::new(1, 0)));
        let _ = pathfinder.find_path(&mut grid, &at(0, 0), GridPos::new(2, 0), false);

        pathfinder.clear_ignore_list(&mut grid);
        assert_eq!(grid, before);
        assert_eq!(pathfinder.ignored_count(), 0);
    }

    #[test]
    fn ignoring_an_already_walkable_cell_restores_walkable() {
        let mut grid = OccupancyGrid::open(3, 1);
        let before = grid.clone();
        let mut pathfinder = Pathfinder::new();
        pathfinder.ignore(&at(1, 0));

        let _ = pathfinder.find_path(&mut grid, &at(0, 0), GridPos::new(2, 0), false);
        pathfinder.clear_ignore_list(&mut grid);

        assert_eq!(grid, before);
    }
}
