//! Canonical spanning graph: the atom visit order and bond classification
//! (tree edge vs ring closure) that the codecs serialize.

use crate::molecule::GraphView;
use tracing::instrument;

/// Atoms in canonical order plus the spanning tree over them. `index_of`
/// maps original atom indices to canonical positions.
#[derive(Debug, Default, Clone)]
pub struct CanonGraph {
    pub atoms: Vec<usize>,
    pub index_of: Vec<usize>,
    /// Parent position per canonical position; `None` marks a fragment root.
    pub from: Vec<Option<usize>>,
    /// Original bond index joining a position to its parent.
    pub from_bond: Vec<Option<usize>>,
    /// Ring-closure bonds, sorted by their canonical endpoint pair.
    pub closures: Vec<usize>,
}

impl CanonGraph {
    /// Canonical endpoints of a bond, lower position first.
    pub fn closure_ends<M: GraphView>(&self, mol: &M, bond: usize) -> (usize, usize) {
        let (a, b) = mol.bond_atoms(bond);
        let (x, y) = (self.index_of[a], self.index_of[b]);
        (x.min(y), x.max(y))
    }
}

/// Walk the molecule highest rank first: each placed atom keeps attaching
/// its highest-ranked unplaced neighbor before the walk advances, and
/// disconnected fragments restart at the highest-ranked remaining atom.
#[instrument(level = "debug", skip_all)]
pub(crate) fn build<M: GraphView>(mol: &M, rank: &[u32]) -> CanonGraph {
    let n = mol.atom_count();
    let mut g = CanonGraph {
        atoms: Vec::with_capacity(n),
        index_of: vec![usize::MAX; n],
        from: Vec::with_capacity(n),
        from_bond: Vec::with_capacity(n),
        closures: Vec::new(),
    };
    let mut placed = vec![false; n];
    let mut current = 0;
    while g.atoms.len() < n {
        // fragment root: highest-ranked unplaced atom
        let root = (0..n)
            .filter(|&a| !placed[a])
            .max_by_key(|&a| rank[a])
            .unwrap_or(0);
        placed[root] = true;
        g.index_of[root] = g.atoms.len();
        g.atoms.push(root);
        g.from.push(None);
        g.from_bond.push(None);

        while current < g.atoms.len() {
            let here = g.atoms[current];
            loop {
                let next = mol
                    .neighbors(here)
                    .iter()
                    .filter(|&&(nb, _)| !placed[nb])
                    .max_by_key(|&&(nb, _)| rank[nb]);
                let Some(&(nb, bond)) = next else {
                    break;
                };
                placed[nb] = true;
                g.index_of[nb] = g.atoms.len();
                g.atoms.push(nb);
                g.from.push(Some(current));
                g.from_bond.push(Some(bond));
            }
            current += 1;
        }
    }

    let tree: Vec<usize> = g.from_bond.iter().flatten().copied().collect();
    let mut closures: Vec<usize> = (0..mol.bond_count())
        .filter(|b| !tree.contains(b))
        .collect();
    closures.sort_unstable_by_key(|&b| g.closure_ends(mol, b));
    g.closures = closures;
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Bond, Molecule};

    fn path3() -> Molecule {
        let mut mol = Molecule::new();
        let a = mol.add_atom(Atom::new(8));
        let b = mol.add_atom(Atom::new(6));
        let c = mol.add_atom(Atom::new(6));
        mol.add_bond(a, b, Bond::single());
        mol.add_bond(b, c, Bond::single());
        mol.finalize();
        mol
    }

    #[test]
    fn walk_starts_at_highest_rank() {
        let mol = path3();
        let g = build(&mol, &[3, 2, 1]);
        assert_eq!(g.atoms, vec![0, 1, 2]);
        assert_eq!(g.from, vec![None, Some(0), Some(1)]);
        assert!(g.closures.is_empty());
    }

    #[test]
    fn ring_bond_becomes_closure() {
        let mut mol = Molecule::new();
        let a = mol.add_atom(Atom::new(6));
        let b = mol.add_atom(Atom::new(6));
        let c = mol.add_atom(Atom::new(6));
        mol.add_bond(a, b, Bond::single());
        mol.add_bond(b, c, Bond::single());
        mol.add_bond(c, a, Bond::single());
        mol.finalize();
        let g = build(&mol, &[3, 2, 1]);
        assert_eq!(g.atoms.len(), 3);
        assert_eq!(g.closures.len(), 1);
        assert_eq!(g.from.iter().flatten().count(), 2);
    }
}
