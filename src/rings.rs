//! Smallest-ring-size helper arrays.
//!
//! The canonizer consumes ring sizes as precomputed data; this module is the
//! collaborator that computes them. For every bond, the smallest ring through
//! it is found with a BFS that avoids the bond itself; atom ring sizes are the
//! minimum over the atom's ring bonds. Sizes are capped at 31 to match the
//! 5-bit invariant field.

use std::collections::VecDeque;

pub const MAX_RING_SIZE: u8 = 31;

/// Returns `(atom_ring_size, bond_ring_size)`, 0 for acyclic atoms/bonds.
pub fn smallest_ring_sizes(
    adj: &[Vec<(usize, usize)>],
    bond_ends: &[(usize, usize)],
) -> (Vec<u8>, Vec<u8>) {
    let n = adj.len();
    let mut atom_size = vec![0u8; n];
    let mut bond_size = vec![0u8; bond_ends.len()];

    for (bi, &(u, v)) in bond_ends.iter().enumerate() {
        if let Some(len) = shortest_path_avoiding(adj, u, v, bi) {
            let size = (len + 1).min(MAX_RING_SIZE as usize) as u8;
            bond_size[bi] = size;
        }
    }
    for (bi, &(u, v)) in bond_ends.iter().enumerate() {
        let s = bond_size[bi];
        if s == 0 {
            continue;
        }
        for a in [u, v] {
            if atom_size[a] == 0 || s < atom_size[a] {
                atom_size[a] = s;
            }
        }
    }
    (atom_size, bond_size)
}

/// Length (in bonds) of the shortest path from `u` to `v` that does not use
/// bond `skip`, or `None` if the bond is a bridge.
fn shortest_path_avoiding(
    adj: &[Vec<(usize, usize)>],
    u: usize,
    v: usize,
    skip: usize,
) -> Option<usize> {
    let mut dist = vec![usize::MAX; adj.len()];
    let mut queue = VecDeque::new();
    dist[u] = 0;
    queue.push_back(u);
    while let Some(x) = queue.pop_front() {
        if x == v {
            return Some(dist[x]);
        }
        if dist[x] + 1 >= MAX_RING_SIZE as usize {
            continue;
        }
        for &(y, b) in &adj[x] {
            if b == skip || dist[y] != usize::MAX {
                continue;
            }
            dist[y] = dist[x] + 1;
            queue.push_back(y);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, bonds: &[(usize, usize)]) -> (Vec<Vec<(usize, usize)>>, Vec<(usize, usize)>) {
        let mut adj = vec![Vec::new(); n];
        for (bi, &(u, v)) in bonds.iter().enumerate() {
            adj[u].push((v, bi));
            adj[v].push((u, bi));
        }
        (adj, bonds.to_vec())
    }

    #[test]
    fn chain_has_no_rings() {
        let (adj, ends) = graph(3, &[(0, 1), (1, 2)]);
        let (atoms, bonds) = smallest_ring_sizes(&adj, &ends);
        assert!(atoms.iter().all(|&s| s == 0));
        assert!(bonds.iter().all(|&s| s == 0));
    }

    #[test]
    fn cyclopropane_ring_of_three() {
        let (adj, ends) = graph(3, &[(0, 1), (1, 2), (2, 0)]);
        let (atoms, bonds) = smallest_ring_sizes(&adj, &ends);
        assert!(atoms.iter().all(|&s| s == 3));
        assert!(bonds.iter().all(|&s| s == 3));
    }

    #[test]
    fn fused_bicycle_smallest_wins() {
        // two triangles sharing bond 0-1, plus a tail at atom 3
        let (adj, ends) = graph(
            5,
            &[(0, 1), (1, 2), (2, 0), (1, 3), (3, 0), (3, 4)],
        );
        let (atoms, bonds) = smallest_ring_sizes(&adj, &ends);
        assert_eq!(atoms[0], 3);
        assert_eq!(atoms[4], 0);
        assert_eq!(bonds[5], 0);
        assert_eq!(bonds[0], 3);
    }
}
