use super::macros::trace_capture;
use super::mols::*;
use crate::canon::{decode_coordinates, decode_idcode, decode_mapping, Canonizer, DecodeError};
use crate::molecule::{BondStereo, Esr, GraphView, Molecule, Parity, StereoView};

fn reencode(mol: &Molecule) -> (String, String) {
    let first = Canonizer::new(mol).idcode().to_string();
    let decoded = decode_idcode(&first).expect("own output must decode");
    let second = Canonizer::new(&decoded).idcode().to_string();
    (first, second)
}

#[test]
fn encode_decode_encode_is_idempotent() {
    trace_capture!();
    for mol in [
        chain(1),
        chain(7),
        chiral_center(),
        butene(true),
        butene(false),
        butanediol(true),
        butanediol(false),
    ] {
        let (first, second) = reencode(&mol);
        assert_eq!(first, second);
    }
}

#[test]
fn decoding_preserves_the_formula() {
    let mol = chain(5);
    let decoded = decode_idcode(Canonizer::new(&mol).idcode()).unwrap();
    assert_eq!(decoded.atom_count(), 5);
    assert_eq!(decoded.bond_count(), 4);
    assert!((0..5).all(|a| decoded.atomic_num(a) == 6));
    let h_total: u32 = (0..5).map(|a| decoded.implicit_h(a) as u32).sum();
    assert_eq!(h_total, 12);
    assert!(decoded.parities_valid());
}

#[test]
fn heteroatoms_and_charges_survive() {
    let mut mol = chain(4);
    mol.atom_mut(1).atomic_num = 7;
    mol.atom_mut(1).charge = 1;
    mol.atom_mut(1).implicit_h = 2;
    mol.atom_mut(3).atomic_num = 16;
    mol.atom_mut(3).implicit_h = 1;
    mol.atom_mut(3).mass = 34;
    mol.finalize();
    let decoded = decode_idcode(Canonizer::new(&mol).idcode()).unwrap();
    let mut formula: Vec<(u8, i8, u16)> = (0..4)
        .map(|a| (decoded.atomic_num(a), decoded.charge(a), decoded.mass(a)))
        .collect();
    formula.sort_unstable();
    assert_eq!(
        formula,
        vec![(6, 0, 0), (6, 0, 0), (7, 1, 0), (16, 0, 34)]
    );
    let (first, second) = reencode(&mol);
    assert_eq!(first, second);
}

#[test]
fn stereo_round_trips_through_the_code() {
    let mol = chiral_center();
    let canon = Canonizer::new(&mol);
    let decoded = decode_idcode(canon.idcode()).unwrap();
    let redone = Canonizer::new(&decoded);
    assert_eq!(redone.chirality(), canon.chirality());
    // the decoded copy carries parities instead of wedges
    assert_eq!(decoded.dims(), 0);
    assert!((0..4).any(|a| decoded.th_parity(a).is_definite()));
}

#[test]
fn coordinates_round_trip_approximately() {
    let mol = butene(true);
    let canon = Canonizer::new(&mol);
    let coords = canon.encode_coordinates(false).expect("2D input");
    let parents = crate::canon::decode::tree_parents(canon.idcode()).unwrap();
    let mut decoded = decode_idcode(canon.idcode()).unwrap();
    decode_coordinates(&coords, &parents, &mut decoded).unwrap();
    assert_eq!(decoded.dims(), 2);
    // relative geometry survives quantization: bonded atoms stay closer
    // than the far methyl pair
    let dist = |m: &Molecule, a: usize, b: usize| {
        let (p, q) = (m.coords(a), m.coords(b));
        ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt()
    };
    let (x, y) = decoded.bond_atoms(0);
    let far_a = 0;
    let far_b = decoded.atom_count() - 1;
    assert!(dist(&decoded, x, y) < dist(&decoded, far_a, far_b));
}

#[test]
fn coordinates_do_not_disturb_the_reencoded_idcode() {
    trace_capture!();
    // decoded coordinates have no wedges; the stored parities must still
    // drive a re-encode to the identical idcode
    for mol in [chiral_center(), butene(true), butanediol(true)] {
        let canon = Canonizer::new(&mol);
        let coords = canon.encode_coordinates(false).expect("2D input");
        let parents = crate::canon::decode::tree_parents(canon.idcode()).unwrap();
        let mut decoded = decode_idcode(canon.idcode()).unwrap();
        decode_coordinates(&coords, &parents, &mut decoded).unwrap();
        assert_eq!(Canonizer::new(&decoded).idcode(), canon.idcode());
    }
}

#[test]
fn grouped_unknown_parity_decodes_as_unknown() {
    // an And group on a center with no wedge carries no configuration;
    // it must not come back as a definite parity
    let mut mol = chiral_center();
    mol.bond_mut(0).stereo = BondStereo::None;
    mol.atom_mut(0).esr = Esr::and(0);
    mol.finalize();
    let decoded = decode_idcode(Canonizer::new(&mol).idcode()).unwrap();
    assert!((0..decoded.atom_count()).all(|a| !decoded.th_parity(a).is_definite()));
    assert!((0..decoded.atom_count()).any(|a| decoded.th_parity(a) == Parity::Unknown));
}

#[test]
fn mapping_round_trips() {
    let mut mol = chain(4);
    for (a, map) in [(0, 4u16), (1, 2), (2, 3), (3, 1)] {
        mol.atom_mut(a).map_no = map;
    }
    mol.finalize();
    let canon = Canonizer::new(&mol);
    let mapping = canon.encode_mapping().expect("atoms are mapped");
    let mut decoded = decode_idcode(canon.idcode()).unwrap();
    decode_mapping(&mapping, &mut decoded).unwrap();
    let mut maps: Vec<u16> = (0..4).map(|a| decoded.map_no(a)).collect();
    maps.sort_unstable();
    assert_eq!(maps, vec![1, 2, 3, 4]);
}

#[test]
fn unmapped_molecule_has_no_mapping_stream() {
    let mol = chain(3);
    assert!(Canonizer::new(&mol).encode_mapping().is_none());
    assert!(Canonizer::new(&mol).encode_coordinates(false).is_none());
}

#[test]
fn truncated_idcode_fails_cleanly() {
    let mol = butanediol(true);
    let idcode = Canonizer::new(&mol).idcode().to_string();
    for cut in 1..idcode.len() {
        assert!(decode_idcode(&idcode[..cut]).is_err());
    }
}

#[test]
fn garbage_characters_are_rejected() {
    assert!(matches!(
        decode_idcode("not an idcode!"),
        Err(DecodeError::BadSymbol(' '))
    ));
}
