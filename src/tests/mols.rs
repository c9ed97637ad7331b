//! Shared molecule builders. Implicit hydrogen counts follow standard
//! valence so decoded copies reconstruct them identically.

use crate::molecule::{Atom, Bond, GraphView, Molecule, StereoView};

pub fn atom2d(z: u8, h: u8, x: f64, y: f64) -> Atom {
    let mut a = Atom::at(z, x, y);
    a.implicit_h = h;
    a
}

/// Unbranched all-carbon chain, no coordinates.
pub fn chain(n: usize) -> Molecule {
    let mut mol = Molecule::new();
    let mut prev = None;
    for i in 0..n {
        let h = if n == 1 {
            4
        } else if i == 0 || i == n - 1 {
            3
        } else {
            2
        };
        let mut a = Atom::new(6);
        a.implicit_h = h;
        let idx = mol.add_atom(a);
        if let Some(p) = prev {
            mol.add_bond(p, idx, Bond::single());
        }
        prev = Some(idx);
    }
    mol.finalize();
    mol
}

/// Bromochlorofluoromethane drawn in 2D with a wedge to fluorine.
pub fn chiral_center() -> Molecule {
    let mut mol = Molecule::new();
    let c = mol.add_atom(atom2d(6, 1, 0.0, 0.0));
    let f = mol.add_atom(atom2d(9, 0, 1.0, 0.0));
    let cl = mol.add_atom(atom2d(17, 0, -0.5, 0.87));
    let br = mol.add_atom(atom2d(35, 0, -0.5, -0.87));
    mol.add_bond(c, f, Bond::up());
    mol.add_bond(c, cl, Bond::single());
    mol.add_bond(c, br, Bond::single());
    mol.set_dims(2);
    mol.finalize();
    mol
}

/// 2-butene; `cis` picks which side of the double bond the far methyl sits.
pub fn butene(cis: bool) -> Molecule {
    let mut mol = Molecule::new();
    let c1 = mol.add_atom(atom2d(6, 3, -0.5, 0.87));
    let c2 = mol.add_atom(atom2d(6, 1, 0.0, 0.0));
    let c3 = mol.add_atom(atom2d(6, 1, 1.0, 0.0));
    let y4 = if cis { 0.87 } else { -0.87 };
    let c4 = mol.add_atom(atom2d(6, 3, 1.5, y4));
    mol.add_bond(c1, c2, Bond::single());
    mol.add_bond(c2, c3, Bond::double());
    mol.add_bond(c3, c4, Bond::single());
    mol.set_dims(2);
    mol.finalize();
    mol
}

/// Butane-2,3-diol. Both hydroxyls wedged up gives the meso form; flipping
/// one gives the (R,R)/(S,S) pair.
pub fn butanediol(meso: bool) -> Molecule {
    let mut mol = Molecule::new();
    let c1 = mol.add_atom(atom2d(6, 3, -1.0, -0.87));
    let c2 = mol.add_atom(atom2d(6, 1, -0.5, 0.0));
    let c3 = mol.add_atom(atom2d(6, 1, 0.5, 0.0));
    let c4 = mol.add_atom(atom2d(6, 3, 1.0, -0.87));
    let o5 = mol.add_atom(atom2d(8, 1, -0.5, 1.0));
    let o6 = mol.add_atom(atom2d(8, 1, 0.5, 1.0));
    mol.add_bond(c1, c2, Bond::single());
    mol.add_bond(c2, c3, Bond::single());
    mol.add_bond(c3, c4, Bond::single());
    mol.add_bond(c2, o5, Bond::up());
    mol.add_bond(c3, o6, if meso { Bond::up() } else { Bond::down() });
    mol.set_dims(2);
    mol.finalize();
    mol
}

/// Mirror image: x coordinates negated.
pub fn mirrored(mol: &Molecule) -> Molecule {
    let mut out = mol.clone();
    for a in 0..out.atom_count() {
        let x = out.atom(a).coords[0];
        out.atom_mut(a).coords[0] = -x;
    }
    out.finalize();
    out
}

/// Rebuild with atom indices relabeled; `perm[old]` is the new index.
pub fn permuted(mol: &Molecule, perm: &[usize]) -> Molecule {
    let n = mol.atom_count();
    assert_eq!(perm.len(), n);
    let mut inverse = vec![0usize; n];
    for (old, &new) in perm.iter().enumerate() {
        inverse[new] = old;
    }
    let mut out = Molecule::new();
    out.is_fragment = mol.is_fragment;
    for &old in &inverse {
        out.add_atom(mol.atom(old).clone());
    }
    for b in 0..mol.bond_count() {
        let (x, y) = mol.bond_atoms(b);
        out.add_bond(perm[x], perm[y], mol.bond(b).clone());
    }
    out.set_dims(mol.dims());
    out.finalize();
    out
}
