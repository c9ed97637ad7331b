use super::macros::trace_capture;
use super::mols::*;
use crate::canon::{Canonizer, Mode};
use crate::molecule::{Atom, Bond, GraphView, Molecule};

#[test]
fn empty_molecule_has_an_idcode() {
    let mut mol = Molecule::new();
    mol.finalize();
    let canon = Canonizer::new(&mol);
    assert!(!canon.idcode().is_empty());
}

#[test]
fn final_rank_is_total() {
    let mol = chain(6);
    let canon = Canonizer::new(&mol);
    let mut ranks = canon.final_rank().to_vec();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=6).collect::<Vec<_>>());
}

#[test]
fn symmetry_rank_keeps_equivalent_atoms_together() {
    let mol = chain(5);
    let mode = Mode::new().with_create_symmetry_rank(true);
    let canon = Canonizer::with_mode(&mol, mode);
    let sym = canon.symmetry_rank().expect("mode requested it");
    // pentane: two ends, two inner CH2, one center
    assert_eq!(sym[0], sym[4]);
    assert_eq!(sym[1], sym[3]);
    assert_ne!(sym[0], sym[1]);
    assert_ne!(sym[1], sym[2]);
}

/// 3-methylpentan-2-ol under a handful of relabelings.
#[test]
fn idcode_is_permutation_invariant() {
    trace_capture!();
    let mut mol = Molecule::new();
    let atom = |z: u8, h: u8| {
        let mut a = Atom::new(z);
        a.implicit_h = h;
        a
    };
    let c1 = mol.add_atom(atom(6, 3));
    let c2 = mol.add_atom(atom(6, 1));
    let c3 = mol.add_atom(atom(6, 1));
    let c4 = mol.add_atom(atom(6, 2));
    let c5 = mol.add_atom(atom(6, 3));
    let c6 = mol.add_atom(atom(6, 3));
    let o = mol.add_atom(atom(8, 1));
    mol.add_bond(c1, c2, Bond::single());
    mol.add_bond(c2, c3, Bond::single());
    mol.add_bond(c3, c4, Bond::single());
    mol.add_bond(c4, c5, Bond::single());
    mol.add_bond(c3, c6, Bond::single());
    mol.add_bond(c2, o, Bond::single());
    mol.finalize();

    let reference = Canonizer::new(&mol).idcode().to_string();
    let n = mol.atom_count();
    for rot in 1..n {
        let perm: Vec<usize> = (0..n).map(|i| (i + rot) % n).collect();
        let relabeled = permuted(&mol, &perm);
        assert_eq!(
            Canonizer::new(&relabeled).idcode(),
            reference,
            "rotation by {rot} changed the idcode"
        );
    }
    let reversal: Vec<usize> = (0..n).rev().collect();
    assert_eq!(Canonizer::new(&permuted(&mol, &reversal)).idcode(), reference);
}

#[test]
fn stereo_permutation_invariance() {
    let mol = chiral_center();
    let reference = Canonizer::new(&mol).idcode().to_string();
    let n = mol.atom_count();
    for rot in 1..n {
        let perm: Vec<usize> = (0..n).map(|i| (i + rot) % n).collect();
        assert_eq!(Canonizer::new(&permuted(&mol, &perm)).idcode(), reference);
    }
}

#[test]
fn neglect_stereo_shrinks_the_idcode() {
    let mol = chiral_center();
    let full = Canonizer::new(&mol).idcode().to_string();
    let mode = Mode::new().with_neglect_any_stereo(true);
    let bare = Canonizer::with_mode(&mol, mode).idcode().to_string();
    assert!(bare.len() < full.len());
}

#[test]
fn disconnected_fragments_each_get_a_root() {
    let mut mol = chain(3);
    let lone = mol.add_atom(Atom::new(8));
    mol.atom_mut(lone).implicit_h = 2;
    mol.finalize();
    let canon = Canonizer::new(&mol);
    let roots = canon.canon_graph().from.iter().filter(|f| f.is_none()).count();
    assert_eq!(roots, 2);
    assert_eq!(canon.canon_graph().atoms.len(), 4);
}

#[test]
fn delocalized_ring_atoms_share_one_symmetry_rank() {
    use crate::molecule::BondKind;
    let mut mol = Molecule::new();
    for _ in 0..6 {
        let mut a = Atom::new(6);
        a.implicit_h = 1;
        mol.add_atom(a);
    }
    for i in 0..6 {
        mol.add_bond(i, (i + 1) % 6, Bond::new(BondKind::Delocalized));
    }
    mol.finalize();
    let mode = Mode::new().with_create_symmetry_rank(true);
    let canon = Canonizer::with_mode(&mol, mode);
    let sym = canon.symmetry_rank().expect("mode requested it");
    assert!(sym.iter().all(|&r| r == sym[0]));

    let reference = canon.idcode().to_string();
    for rot in 1..6 {
        let perm: Vec<usize> = (0..6).map(|i| (i + rot) % 6).collect();
        assert_eq!(Canonizer::new(&permuted(&mol, &perm)).idcode(), reference);
    }
}

#[test]
fn heteroatom_placement_affects_the_idcode() {
    let a = {
        let mut mol = chain(4);
        mol.atom_mut(0).atomic_num = 7;
        mol.finalize();
        mol
    };
    let b = {
        let mut mol = chain(4);
        mol.atom_mut(1).atomic_num = 7;
        mol.finalize();
        mol
    };
    assert_ne!(Canonizer::new(&a).idcode(), Canonizer::new(&b).idcode());
}
