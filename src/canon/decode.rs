//! Idcode and coordinate decoders. A decoded molecule carries its atoms in
//! canonical order with `parities_valid` set: the stored parities are
//! relative to the canonical rank order, so a re-encode uses them directly
//! whether or not a coordinate stream was applied on top.

use super::encode::{log_decode, SYMBOLS, VERSION};
use crate::molecule::{
    Atom, Bond, BondKind, Esr, EsrType, GraphView, Molecule, Parity, Radical, StereoWrite,
};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("idcode ended before all declared fields were read")]
    Truncated,
    #[error("character {0:?} is not in the idcode alphabet")]
    BadSymbol(char),
    #[error("unsupported idcode version {0}")]
    BadVersion(u8),
    #[error("unknown feature block code {0}")]
    BadFeatureCode(u32),
    #[error("index {index} out of range (max {max})")]
    IndexOutOfRange { index: usize, max: usize },
}

/// MSB-first bit reader over the 6-bit symbol stream.
#[derive(Debug)]
pub(crate) struct SymbolReader {
    data: Vec<u8>,
    bit: usize,
}

impl SymbolReader {
    pub fn new(s: &str) -> Result<Self, DecodeError> {
        let data = s
            .chars()
            .map(|c| {
                SYMBOLS
                    .iter()
                    .position(|&sym| sym as char == c)
                    .map(|p| p as u8)
                    .ok_or(DecodeError::BadSymbol(c))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { data, bit: 0 })
    }

    pub fn read(&mut self, bits: u32) -> Result<u64, DecodeError> {
        if self.bit + bits as usize > self.data.len() * 6 {
            return Err(DecodeError::Truncated);
        }
        let mut out = 0u64;
        for _ in 0..bits {
            let sym = self.data[self.bit / 6];
            let shift = 5 - (self.bit % 6);
            out = (out << 1) | ((sym >> shift) & 1) as u64;
            self.bit += 1;
        }
        Ok(out)
    }
}

fn checked_index(value: u64, max: usize) -> Result<usize, DecodeError> {
    let index = value as usize;
    if index >= max {
        return Err(DecodeError::IndexOutOfRange { index, max });
    }
    Ok(index)
}

fn stereo_decode(code: u64) -> (Parity, EsrType) {
    match code {
        1 => (Parity::One, EsrType::Abs),
        2 => (Parity::Two, EsrType::Abs),
        4 => (Parity::One, EsrType::And),
        5 => (Parity::Two, EsrType::And),
        6 => (Parity::One, EsrType::Or),
        7 => (Parity::Two, EsrType::Or),
        _ => (Parity::Unknown, EsrType::Abs),
    }
}

#[instrument(level = "debug", skip_all)]
pub fn decode_idcode(idcode: &str) -> Result<Molecule, DecodeError> {
    let mut r = SymbolReader::new(idcode)?;
    let version = r.read(4)? as u8;
    if version as u64 != VERSION {
        return Err(DecodeError::BadVersion(version));
    }
    let nbits = r.read(4)? as u32;
    let mut mol = Molecule::new();
    if nbits == 0 {
        mol.finalize();
        return Ok(mol);
    }
    let ac = r.read(nbits)? as usize;
    let bc = r.read(nbits)? as usize;

    let mut atoms: Vec<Atom> = (0..ac).map(|_| Atom::new(6)).collect();
    for z in [7u8, 8] {
        let count = r.read(nbits)? as usize;
        for _ in 0..count {
            let pos = checked_index(r.read(nbits)?, ac)?;
            atoms[pos].atomic_num = z;
        }
    }
    let other = r.read(nbits)? as usize;
    for _ in 0..other {
        let pos = checked_index(r.read(nbits)?, ac)?;
        atoms[pos].atomic_num = r.read(8)? as u8;
    }
    let charged = r.read(nbits)? as usize;
    for _ in 0..charged {
        let pos = checked_index(r.read(nbits)?, ac)?;
        atoms[pos].charge = r.read(4)? as i8 - 8;
    }

    // spanning tree: `pos - delta` is the parent, 0 marks a fragment root
    let dbits = r.read(4)? as u32;
    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(bc);
    for pos in 1..ac {
        let delta = r.read(dbits)? as usize;
        if delta != 0 {
            if delta > pos {
                return Err(DecodeError::IndexOutOfRange {
                    index: delta,
                    max: pos,
                });
            }
            edges.push((pos - delta, pos));
        }
    }
    let closures = bc.saturating_sub(edges.len());
    for _ in 0..closures {
        let lo = checked_index(r.read(nbits)?, ac)?;
        let hi = checked_index(r.read(nbits)?, ac)?;
        edges.push((lo, hi));
    }

    let mut bonds: Vec<Bond> = Vec::with_capacity(bc);
    for _ in 0..bc {
        bonds.push(match r.read(2)? {
            2 => Bond::double(),
            3 => Bond::new(BondKind::Triple),
            // rare orders are restored by the feature chain
            _ => Bond::single(),
        });
    }

    let th_count = r.read(nbits)? as usize;
    for _ in 0..th_count {
        let pos = checked_index(r.read(nbits)?, ac)?;
        let code = r.read(3)?;
        let (parity, kind) = stereo_decode(code);
        let group = if kind != EsrType::Abs { r.read(3)? as u8 } else { 0 };
        atoms[pos].th_parity = parity;
        atoms[pos].esr = Esr { kind, group };
    }
    let ez_count = r.read(nbits)? as usize;
    for _ in 0..ez_count {
        let idx = checked_index(r.read(nbits)?, bc)?;
        if r.read(1)? == 1 {
            let code = r.read(3)?;
            let (parity, kind) = stereo_decode(code);
            let group = if kind != EsrType::Abs { r.read(3)? as u8 } else { 0 };
            bonds[idx].ez_parity = parity;
            bonds[idx].esr = Esr { kind, group };
        } else {
            bonds[idx].ez_parity = Parity::from_code(r.read(2)? as u8);
        }
    }

    let is_fragment = r.read(1)? == 1;
    decode_features(&mut r, nbits, ac, bc, &mut atoms, &mut bonds)?;

    mol.is_fragment = is_fragment;
    for atom in atoms {
        mol.add_atom(atom);
    }
    for (bond, (a, b)) in bonds.into_iter().zip(edges) {
        mol.add_bond(a, b, bond);
    }
    // hydrogens are implicit in the code; restore them from valence
    let mut occupied = vec![0u8; ac];
    for b in 0..bc {
        let (x, y) = mol.bond_atoms(b);
        let o = mol.bond_kind(b).order();
        occupied[x] = occupied[x].saturating_add(o);
        occupied[y] = occupied[y].saturating_add(o);
    }
    for (pos, occ) in occupied.into_iter().enumerate() {
        let atom = mol.atom_mut(pos);
        atom.implicit_h = implicit_hydrogens(
            atom.atomic_num,
            atom.charge,
            atom.abnormal_valence,
            atom.radical,
            occ,
        );
    }
    mol.set_dims(0);
    mol.set_parities_valid(true);
    mol.finalize();
    Ok(mol)
}

/// Standard-valence hydrogen count for one atom with `occupied` bonded
/// valences. Positive charge raises the valence of N/O-column elements;
/// any other charge and each unpaired electron lower it.
fn implicit_hydrogens(
    z: u8,
    charge: i8,
    abnormal_valence: Option<u8>,
    radical: Radical,
    occupied: u8,
) -> u8 {
    let base = abnormal_valence.unwrap_or(match z {
        1 | 9 | 17 | 35 | 53 => 1,
        8 | 16 | 34 => 2,
        5 | 7 | 15 | 33 => 3,
        6 | 14 => 4,
        _ => 0,
    }) as i16;
    let charge_shift = match z {
        7 | 8 | 15 | 16 | 33 | 34 => charge as i16,
        _ => -(charge.abs() as i16),
    };
    let unpaired = match radical {
        Radical::Doublet => 1,
        Radical::Triplet => 2,
        _ => 0,
    };
    (base + charge_shift - unpaired - occupied as i16).max(0) as u8
}

fn decode_features(
    r: &mut SymbolReader,
    nbits: u32,
    ac: usize,
    bc: usize,
    atoms: &mut [Atom],
    bonds: &mut [Bond],
) -> Result<(), DecodeError> {
    while r.read(1)? == 1 {
        let mut code = r.read(4)? as u32;
        if code == 15 {
            code = 16 + r.read(4)? as u32;
        }
        match code {
            0 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    atoms[pos].mass = r.read(16)? as u16;
                }
            }
            1 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    let len = r.read(8)? as usize;
                    let mut list = Vec::with_capacity(len);
                    for _ in 0..len {
                        list.push(r.read(8)? as u8);
                    }
                    atoms[pos].atom_list = Some(list);
                }
            }
            2 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    atoms[pos].abnormal_valence = Some(r.read(4)? as u8);
                }
            }
            3 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    let len = r.read(8)? as usize;
                    let mut label = String::with_capacity(len);
                    for _ in 0..len {
                        label.push(r.read(7)? as u8 as char);
                    }
                    atoms[pos].custom_label = Some(label);
                }
            }
            4 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    atoms[pos].radical = Radical::from_code(r.read(2)? as u8);
                }
            }
            5 => {
                for atom in atoms.iter_mut() {
                    atom.selected = r.read(1)? == 1;
                }
            }
            6 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let idx = checked_index(r.read(nbits)?, bc)?;
                    bonds[idx].kind = BondKind::Delocalized;
                }
            }
            7 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let idx = checked_index(r.read(nbits)?, bc)?;
                    bonds[idx].kind = BondKind::Dative;
                }
            }
            8 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let idx = checked_index(r.read(nbits)?, bc)?;
                    bonds[idx].kind = if r.read(1)? == 1 {
                        BondKind::Quintuple
                    } else {
                        BondKind::Quadruple
                    };
                }
            }
            9 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let pos = checked_index(r.read(nbits)?, ac)?;
                    atoms[pos].query_features = r.read(32)? as u32;
                }
            }
            10 => {
                let count = r.read(nbits)? as usize;
                for _ in 0..count {
                    let idx = checked_index(r.read(nbits)?, bc)?;
                    bonds[idx].query_features = r.read(32)? as u32;
                }
            }
            other => return Err(DecodeError::BadFeatureCode(other)),
        }
    }
    Ok(())
}

/// Decode a coordinate side channel onto a molecule whose atoms are in
/// canonical order (as produced by [`decode_idcode`]). `tree_parent` gives
/// the spanning-tree parent per canonical position.
#[instrument(level = "debug", skip_all)]
pub fn decode_coordinates(
    encoded: &str,
    tree_parent: &[Option<usize>],
    mol: &mut Molecule,
) -> Result<(), DecodeError> {
    let mut r = SymbolReader::new(encoded)?;
    let is3d = r.read(1)? == 1;
    let keep_absolute = r.read(1)? == 1;
    let axes = if is3d { 3 } else { 2 };
    let res = if is3d { 16 } else { 8 };
    let half = ((1u64 << (res - 1)) - 1) as f64;
    let max = log_decode(r.read(8)?).max(1e-9);

    let n = tree_parent.len();
    if n != mol.atom_count() {
        return Err(DecodeError::IndexOutOfRange {
            index: n,
            max: mol.atom_count(),
        });
    }
    for pos in 0..n {
        let mut coords = [0f64; 3];
        for axis in coords.iter_mut().take(axes) {
            let raw = r.read(res)? as f64;
            *axis = (raw - half) * max / half;
        }
        match tree_parent[pos] {
            Some(parent) => {
                let base = mol.atom(parent).coords;
                for axis in 0..3 {
                    coords[axis] += base[axis];
                }
            }
            None => {
                for axis in coords.iter_mut() {
                    *axis *= 8.0;
                }
            }
        }
        mol.atom_mut(pos).coords = coords;
    }
    if keep_absolute {
        let _avg_bond_length = log_decode(r.read(8)?);
    }
    // decoded coordinates carry no wedge markings; the stored parities
    // stay authoritative for any later canonicalization
    mol.set_dims(if is3d { 3 } else { 2 });
    Ok(())
}

/// Decode an atom-mapping side channel onto a canonically ordered molecule.
pub fn decode_mapping(encoded: &str, mol: &mut Molecule) -> Result<(), DecodeError> {
    let mut r = SymbolReader::new(encoded)?;
    let mixed = r.read(1)? == 1;
    let mbits = r.read(4)? as u32;
    for pos in 0..mol.atom_count() {
        let map_no = r.read(mbits)? as u16;
        let auto = if mixed { r.read(1)? == 1 } else { false };
        let atom = mol.atom_mut(pos);
        atom.map_no = map_no;
        atom.map_auto = auto;
    }
    Ok(())
}

/// Spanning-tree parents of a decoded idcode, for [`decode_coordinates`].
pub fn tree_parents(idcode: &str) -> Result<Vec<Option<usize>>, DecodeError> {
    let mut r = SymbolReader::new(idcode)?;
    let version = r.read(4)? as u8;
    if version as u64 != VERSION {
        return Err(DecodeError::BadVersion(version));
    }
    let nbits = r.read(4)? as u32;
    if nbits == 0 {
        return Ok(Vec::new());
    }
    let ac = r.read(nbits)? as usize;
    let _bc = r.read(nbits)?;
    // skip N and O lists
    for _ in 0..2 {
        let count = r.read(nbits)? as usize;
        for _ in 0..count {
            r.read(nbits)?;
        }
    }
    let other = r.read(nbits)? as usize;
    for _ in 0..other {
        r.read(nbits)?;
        r.read(8)?;
    }
    let charged = r.read(nbits)? as usize;
    for _ in 0..charged {
        r.read(nbits)?;
        r.read(4)?;
    }
    let dbits = r.read(4)? as u32;
    let mut parents = vec![None; ac];
    for (pos, parent) in parents.iter_mut().enumerate().skip(1) {
        let delta = r.read(dbits)? as usize;
        if delta != 0 && delta <= pos {
            *parent = Some(pos - delta);
        }
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::encode::SymbolWriter;

    #[test]
    fn reader_inverts_writer() {
        let mut w = SymbolWriter::new();
        w.write(4, 9);
        w.write(7, 0x55);
        w.write(13, 0x1234);
        let s = w.finish();
        let mut r = SymbolReader::new(&s).unwrap();
        assert_eq!(r.read(4).unwrap(), 9);
        assert_eq!(r.read(7).unwrap(), 0x55);
        assert_eq!(r.read(13).unwrap(), 0x1234);
    }

    #[test]
    fn reading_past_end_is_truncated() {
        let mut r = SymbolReader::new("A").unwrap();
        assert_eq!(r.read(6).unwrap(), 0);
        assert_eq!(r.read(1), Err(DecodeError::Truncated));
    }

    #[test]
    fn non_alphabet_character_is_rejected() {
        assert_eq!(
            SymbolReader::new("A!").unwrap_err(),
            DecodeError::BadSymbol('!')
        );
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut w = SymbolWriter::new();
        w.write(4, 3);
        w.write(4, 0);
        let s = w.finish();
        assert!(matches!(
            decode_idcode(&s),
            Err(DecodeError::BadVersion(3))
        ));
    }
}
