//! Perft: count leaf nodes of the legal move tree.

use rayon::prelude::*;

use crate::movegen::{generate_legal, legal_moves};
use crate::movelist::MoveList;
use crate::position::Position;
use crate::types::Move;

/// Leaf count at `depth`, using make/unmake on a single position.
pub fn perft(pos: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut list = MoveList::new();
    generate_legal(pos, &mut list);
    // Bulk counting at the last ply
    if depth == 1 {
        return list.len() as u64;
    }

    let mut nodes = 0;
    for mv in list.iter() {
        pos.make_move(mv);
        nodes += perft(pos, depth - 1);
        pos.unmake_move(mv);
    }
    nodes
}

/// Leaf count below each root move, in generation order.
pub fn perft_divide(pos: &mut Position, depth: u32) -> Vec<(Move, u64)> {
    if depth == 0 {
        return Vec::new();
    }
    legal_moves(pos)
        .into_iter()
        .map(|mv| {
            pos.make_move(mv);
            let nodes = perft(pos, depth - 1);
            pos.unmake_move(mv);
            (mv, nodes)
        })
        .collect()
}

/// Same as [`perft`], with the root moves split across the rayon pool.
pub fn perft_parallel(pos: &Position, depth: u32) -> u64 {
    if depth <= 1 {
        return perft(&mut pos.clone(), depth);
    }
    legal_moves(pos)
        .into_par_iter()
        .map(|mv| {
            let mut child = pos.clone();
            child.make_move(mv);
            perft(&mut child, depth - 1)
        })
        .sum()
}

/// Perft from the initial position
///
/// | Depth | Nodes         |
/// | ----- | ------------- |
/// | 1     | 30            |
/// | 2     | 900           |
/// | 3     | 25,470        |
/// | 4     | 719,731       |
/// | 5     | 19,861,490    |
/// | 6     | 547,581,517   |
pub fn expected_startpos_nodes(depth: u32) -> Option<u64> {
    match depth {
        0 => Some(1),
        1 => Some(30),
        2 => Some(900),
        3 => Some(25_470),
        4 => Some(719_731),
        5 => Some(19_861_490),
        6 => Some(547_581_517),
        _ => None,
    }
}
