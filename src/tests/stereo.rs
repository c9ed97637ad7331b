use super::macros::trace_capture;
use super::mols::*;
use crate::canon::{cip, Canonizer, ChiralityClass, CipDescriptor, Ctx, Mode};
use crate::molecule::{Esr, GraphView, Parity};

#[test]
fn wedge_gives_a_definite_parity() {
    let mol = chiral_center();
    let canon = Canonizer::new(&mol);
    assert!(canon.th_parity(0).is_definite());
    assert_eq!(canon.chirality(), ChiralityClass::KnownEnantiomer);
}

#[test]
fn enantiomers_get_different_idcodes() {
    trace_capture!();
    let mol = chiral_center();
    let mirror = mirrored(&mol);
    let a = Canonizer::new(&mol);
    let b = Canonizer::new(&mirror);
    assert_eq!(a.th_parity(0), b.th_parity(0).flipped());
    assert_ne!(a.idcode(), b.idcode());
}

#[test]
fn flat_drawing_is_not_a_stereo_center() {
    let mut mol = chiral_center();
    // remove the wedge: all four substituents in the plane
    mol.bond_mut(0).stereo = crate::molecule::BondStereo::None;
    let canon = Canonizer::new(&mol);
    assert_eq!(canon.th_parity(0), Parity::Unknown);
    assert!(canon.stereo_problem(0));
    assert_eq!(canon.chirality(), ChiralityClass::UnknownEnantiomer);
}

#[test]
fn cip_descriptors_mirror_each_other() {
    let mol = chiral_center();
    let mut labeled = mol.clone();
    Canonizer::new(&mol).set_cip_parities(&mut labeled);
    let d = labeled.atom(0).cip;
    assert!(matches!(d, CipDescriptor::R | CipDescriptor::S));

    let mirror = mirrored(&mol);
    let mut labeled2 = mirror.clone();
    Canonizer::new(&mirror).set_cip_parities(&mut labeled2);
    let d2 = labeled2.atom(0).cip;
    assert_ne!(d, d2);
    assert!(matches!(d2, CipDescriptor::R | CipDescriptor::S));
}

#[test]
fn cis_and_trans_differ() {
    let cis = butene(true);
    let trans = butene(false);
    let a = Canonizer::new(&cis);
    let b = Canonizer::new(&trans);
    assert!(a.ez_parity(1).is_definite());
    assert_eq!(a.ez_parity(1), b.ez_parity(1).flipped());
    assert_ne!(a.idcode(), b.idcode());
    assert_eq!(a.chirality(), ChiralityClass::NotChiral);
}

#[test]
fn double_bond_descriptors_are_e_and_z() {
    let trans = butene(false);
    let mut labeled = trans.clone();
    Canonizer::new(&trans).set_cip_parities(&mut labeled);
    assert_eq!(labeled.bond(1).cip, CipDescriptor::E);

    let cis = butene(true);
    let mut labeled = cis.clone();
    Canonizer::new(&cis).set_cip_parities(&mut labeled);
    assert_eq!(labeled.bond(1).cip, CipDescriptor::Z);
}

#[test]
fn meso_form_equals_its_mirror_image() {
    trace_capture!();
    let meso = butanediol(true);
    let canon = Canonizer::new(&meso);
    assert_eq!(canon.chirality(), ChiralityClass::Meso);
    assert_eq!(Canonizer::new(&mirrored(&meso)).idcode(), canon.idcode());
}

#[test]
fn chiral_diol_is_not_meso() {
    let chiral = butanediol(false);
    let canon = Canonizer::new(&chiral);
    assert_eq!(canon.chirality(), ChiralityClass::KnownEnantiomer);
    assert_ne!(Canonizer::new(&mirrored(&chiral)).idcode(), canon.idcode());
    assert_ne!(canon.idcode(), Canonizer::new(&butanediol(true)).idcode());
}

#[test]
fn and_group_classifies_as_racemic() {
    let mut mol = chiral_center();
    mol.atom_mut(0).esr = Esr::and(0);
    let canon = Canonizer::new(&mol);
    assert_eq!(canon.chirality(), ChiralityClass::Racemic);
}

#[test]
fn racemic_and_group_equals_its_mirror_image() {
    let mut mol = chiral_center();
    mol.atom_mut(0).esr = Esr::and(0);
    let mirror = mirrored(&mol);
    // group normalization forces the same stored parity for both drawings
    assert_eq!(
        Canonizer::new(&mol).idcode(),
        Canonizer::new(&mirror).idcode()
    );
}

#[test]
fn or_group_folds_into_and_unless_distinguished() {
    let mut mol = chiral_center();
    mol.atom_mut(0).esr = Esr::or(0);
    let or_code = Canonizer::new(&mol).idcode().to_string();

    let mut and_mol = chiral_center();
    and_mol.atom_mut(0).esr = Esr::and(0);
    let and_code = Canonizer::new(&and_mol).idcode().to_string();
    assert_eq!(or_code, and_code);

    let mode = Mode::new().with_distinguish_racemic_or_groups(true);
    let distinct = Canonizer::with_mode(&mol, mode).idcode().to_string();
    assert_ne!(distinct, and_code);
}

#[test]
fn cip_level_cap_is_an_error_not_a_panic() {
    let mol = chain(70);
    let ctx = Ctx::new_for_tests(&mol);
    let mid = mol.atom_count() / 2;
    let err = cip::compare_substituents(&mol, &ctx, mid, mid - 1, mid + 1).unwrap_err();
    assert!(matches!(err, cip::CipError::GraphTooLarge { .. }));
}

#[test]
fn cip_distinguishes_by_sphere() {
    // 2-pentanol: the carbinol carbon sees O > propyl > methyl > H
    let mol = {
        use crate::molecule::{Atom, Bond, Molecule};
        let mut m = Molecule::new();
        let atom = |z: u8, h: u8| {
            let mut a = Atom::new(z);
            a.implicit_h = h;
            a
        };
        let c1 = m.add_atom(atom(6, 3));
        let c2 = m.add_atom(atom(6, 1));
        let c3 = m.add_atom(atom(6, 2));
        let c4 = m.add_atom(atom(6, 2));
        let c5 = m.add_atom(atom(6, 3));
        let o = m.add_atom(atom(8, 1));
        m.add_bond(c1, c2, Bond::single());
        m.add_bond(c2, c3, Bond::single());
        m.add_bond(c3, c4, Bond::single());
        m.add_bond(c4, c5, Bond::single());
        m.add_bond(c2, o, Bond::single());
        m.finalize();
        m
    };
    let ctx = Ctx::new_for_tests(&mol);
    use std::cmp::Ordering;
    // oxygen beats carbon in the first sphere
    assert_eq!(
        cip::compare_substituents(&mol, &ctx, 1, 5, 0).unwrap(),
        Some(Ordering::Greater)
    );
    // propyl beats methyl in the second sphere
    assert_eq!(
        cip::compare_substituents(&mol, &ctx, 1, 2, 0).unwrap(),
        Some(Ordering::Greater)
    );
}

#[test]
fn identical_branches_have_no_cip_distinction() {
    let mol = chain(5);
    let ctx = Ctx::new_for_tests(&mol);
    assert_eq!(cip::compare_substituents(&mol, &ctx, 2, 1, 3).unwrap(), None);
}

#[test]
fn cip_ranks_branched_substituents_hierarchically() {
    // -CH(CF3)(CH3) against -CH(CHF2)(CH2F): every sphere holds the same
    // atom multiset, so only the per-branch subtree shapes separate them
    let mol = {
        use crate::molecule::{Atom, Bond, Molecule};
        let mut m = Molecule::new();
        let atom = |z: u8, h: u8| {
            let mut a = Atom::new(z);
            a.implicit_h = h;
            a
        };
        let c0 = m.add_atom(atom(6, 2));
        let a1 = m.add_atom(atom(6, 1));
        let a2 = m.add_atom(atom(6, 0));
        let a3 = m.add_atom(atom(6, 3));
        let b1 = m.add_atom(atom(6, 1));
        let b2 = m.add_atom(atom(6, 1));
        let b3 = m.add_atom(atom(6, 2));
        m.add_bond(c0, a1, Bond::single());
        m.add_bond(a1, a2, Bond::single());
        m.add_bond(a1, a3, Bond::single());
        m.add_bond(c0, b1, Bond::single());
        m.add_bond(b1, b2, Bond::single());
        m.add_bond(b1, b3, Bond::single());
        for _ in 0..3 {
            let f = m.add_atom(atom(9, 0));
            m.add_bond(a2, f, Bond::single());
        }
        for _ in 0..2 {
            let f = m.add_atom(atom(9, 0));
            m.add_bond(b2, f, Bond::single());
        }
        let f = m.add_atom(atom(9, 0));
        m.add_bond(b3, f, Bond::single());
        m.finalize();
        m
    };
    let ctx = Ctx::new_for_tests(&mol);
    assert_eq!(
        cip::compare_substituents(&mol, &ctx, 0, 1, 4).unwrap(),
        Some(std::cmp::Ordering::Greater)
    );
}

#[test]
fn cip_escalates_to_isotope_mass() {
    // propane with one 13C methyl: constitutionally identical branches
    // fall through to the mass comparison
    let mol = {
        use crate::molecule::{Atom, Bond, Molecule};
        let mut m = Molecule::new();
        let atom = |z: u8, h: u8| {
            let mut a = Atom::new(z);
            a.implicit_h = h;
            a
        };
        let c0 = m.add_atom(atom(6, 2));
        let heavy = m.add_atom({
            let mut a = atom(6, 3);
            a.mass = 13;
            a
        });
        let light = m.add_atom(atom(6, 3));
        m.add_bond(c0, heavy, Bond::single());
        m.add_bond(c0, light, Bond::single());
        m.finalize();
        m
    };
    let ctx = Ctx::new_for_tests(&mol);
    assert_eq!(
        cip::compare_substituents(&mol, &ctx, 0, 1, 2).unwrap(),
        Some(std::cmp::Ordering::Greater)
    );
}
