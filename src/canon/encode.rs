//! Bit-packed encoders: the idcode itself plus the coordinate and
//! atom-mapping side channels, all keyed to the canonical graph order.

use super::graph::CanonGraph;
use super::{Ctx, Mode};
use crate::molecule::{BondKind, EsrType, Parity, StereoView};
use tracing::instrument;

/// 64-symbol alphabet; 6 bits per character.
pub(crate) const SYMBOLS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789@#";

pub(crate) const VERSION: u64 = 9;

/// MSB-first bit accumulator flushed into 6-bit symbols.
#[derive(Default)]
pub(crate) struct SymbolWriter {
    acc: u64,
    nbits: u32,
    out: String,
}

impl SymbolWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, bits: u32, value: u64) {
        debug_assert!(bits <= 58 && value >> 1 >> bits.saturating_sub(1) == 0);
        self.acc = (self.acc << bits) | value;
        self.nbits += bits;
        while self.nbits >= 6 {
            self.nbits -= 6;
            let sym = ((self.acc >> self.nbits) & 0x3f) as usize;
            self.out.push(SYMBOLS[sym] as char);
        }
    }

    pub fn finish(mut self) -> String {
        if self.nbits > 0 {
            let pad = 6 - self.nbits;
            self.write(pad, 0);
        }
        self.out
    }
}

/// Bits needed to express `v` (0 for 0).
pub(crate) fn needed_bits(v: u64) -> u32 {
    64 - v.leading_zeros()
}

/// Canonical bond order: tree bonds by child position, then closures.
pub(crate) fn bond_order(g: &CanonGraph) -> Vec<usize> {
    g.from_bond
        .iter()
        .flatten()
        .copied()
        .chain(g.closures.iter().copied())
        .collect()
}

/// Group membership carries no information without a definite parity, so
/// an unknown center always takes the plain code 3. Codes 4 and up signal
/// that group bits follow.
fn stereo_code(parity: Parity, esr: crate::molecule::Esr) -> u64 {
    if !parity.is_definite() {
        return 3;
    }
    let offset = (parity == Parity::Two) as u64;
    match esr.kind {
        EsrType::And => 4 + offset,
        EsrType::Or => 6 + offset,
        _ => 1 + offset,
    }
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn encode_idcode<M: StereoView>(
    mol: &M,
    mode: Mode,
    ctx: &Ctx,
    g: &CanonGraph,
) -> String {
    let mut w = SymbolWriter::new();
    let ac = mol.atom_count() as u64;
    let bc = mol.bond_count() as u64;
    let nbits = needed_bits(ac.max(bc));

    w.write(4, VERSION);
    w.write(4, nbits as u64);
    if nbits == 0 {
        return w.finish();
    }
    w.write(nbits, ac);
    w.write(nbits, bc);

    // heteroatom lists, in canonical position order
    let positions_where = |pred: &dyn Fn(usize) -> bool| -> Vec<u64> {
        g.atoms
            .iter()
            .enumerate()
            .filter(|&(_, &a)| pred(a))
            .map(|(pos, _)| pos as u64)
            .collect()
    };
    let n_list = positions_where(&|a| mol.atomic_num(a) == 7);
    let o_list = positions_where(&|a| mol.atomic_num(a) == 8);
    let other: Vec<(u64, u64)> = g
        .atoms
        .iter()
        .enumerate()
        .filter(|&(_, &a)| !matches!(mol.atomic_num(a), 6 | 7 | 8))
        .map(|(pos, &a)| (pos as u64, mol.atomic_num(a) as u64))
        .collect();
    w.write(nbits, n_list.len() as u64);
    for p in &n_list {
        w.write(nbits, *p);
    }
    w.write(nbits, o_list.len() as u64);
    for p in &o_list {
        w.write(nbits, *p);
    }
    w.write(nbits, other.len() as u64);
    for &(p, z) in &other {
        w.write(nbits, p);
        w.write(8, z);
    }
    let charged: Vec<(u64, u64)> = g
        .atoms
        .iter()
        .enumerate()
        .filter(|&(_, &a)| mol.charge(a) != 0)
        .map(|(pos, &a)| (pos as u64, (mol.charge(a) as i64 + 8) as u64))
        .collect();
    w.write(nbits, charged.len() as u64);
    for &(p, c) in &charged {
        w.write(nbits, p);
        w.write(4, c);
    }

    // spanning tree as parent deltas; 0 marks a fragment root
    let deltas: Vec<u64> = (1..g.atoms.len())
        .map(|pos| match g.from[pos] {
            Some(parent) => (pos - parent) as u64,
            None => 0,
        })
        .collect();
    let dbits = needed_bits(deltas.iter().copied().max().unwrap_or(0));
    w.write(4, dbits as u64);
    for &d in &deltas {
        w.write(dbits, d);
    }
    for &b in &g.closures {
        let (lo, hi) = g.closure_ends(mol, b);
        w.write(nbits, lo as u64);
        w.write(nbits, hi as u64);
    }

    // 2-bit bond codes; non-standard orders resolved by feature lists
    let order = bond_order(g);
    for &b in &order {
        let code = match mol.bond_kind(b) {
            BondKind::Double => 2,
            BondKind::Triple => 3,
            BondKind::Quadruple | BondKind::Quintuple => 0,
            _ => 1,
        };
        w.write(2, code);
    }

    if mode.neglect_any_stereo() {
        w.write(nbits, 0);
        w.write(nbits, 0);
    } else {
        let mut th: Vec<(u64, super::ParityInfo)> = (0..mol.atom_count())
            .filter(|&a| ctx.th[a].parity.is_set())
            .map(|a| (g.index_of[a] as u64, ctx.th[a]))
            .collect();
        th.sort_unstable_by_key(|&(pos, _)| pos);
        w.write(nbits, th.len() as u64);
        for &(pos, ref info) in &th {
            w.write(nbits, pos);
            let code = stereo_code(info.parity, info.esr);
            w.write(3, code);
            if code >= 4 {
                w.write(3, info.esr.group as u64 & 0x7);
            }
        }
        let bond_index: Vec<usize> = {
            let mut idx = vec![0usize; mol.bond_count()];
            for (i, &b) in order.iter().enumerate() {
                idx[b] = i;
            }
            idx
        };
        let mut ez: Vec<(u64, super::ParityInfo)> = (0..mol.bond_count())
            .filter(|&b| ctx.ez[b].parity.is_set())
            .map(|b| (bond_index[b] as u64, ctx.ez[b]))
            .collect();
        ez.sort_unstable_by_key(|&(idx, _)| idx);
        w.write(nbits, ez.len() as u64);
        for &(idx, ref info) in &ez {
            w.write(nbits, idx);
            w.write(1, info.axial as u64);
            if info.axial {
                let code = stereo_code(info.parity, info.esr);
                w.write(3, code);
                if code >= 4 {
                    w.write(3, info.esr.group as u64 & 0x7);
                }
            } else {
                w.write(2, info.parity.code() as u64);
            }
        }
    }

    w.write(1, mol.is_fragment() as u64);
    encode_features(mol, mode, g, &order, nbits, &mut w);
    w.finish()
}

/// Chained feature blocks: `continuation(1) + code(4)` + payload, gated by
/// a non-zero member count. Code 15 shifts the code space by 16.
fn encode_features<M: StereoView>(
    mol: &M,
    mode: Mode,
    g: &CanonGraph,
    order: &[usize],
    nbits: u32,
    w: &mut SymbolWriter,
) {
    let emit = |w: &mut SymbolWriter, code: u64| {
        w.write(1, 1);
        if code >= 15 {
            w.write(4, 15);
            w.write(4, code - 16);
        } else {
            w.write(4, code);
        }
    };

    let atoms_with = |pred: &dyn Fn(usize) -> bool| -> Vec<(u64, usize)> {
        g.atoms
            .iter()
            .enumerate()
            .filter(|&(_, &a)| pred(a))
            .map(|(pos, &a)| (pos as u64, a))
            .collect()
    };

    // 0: isotopes
    let iso = atoms_with(&|a| mol.mass(a) != 0);
    if !iso.is_empty() {
        emit(w, 0);
        w.write(nbits, iso.len() as u64);
        for &(pos, a) in &iso {
            w.write(nbits, pos);
            w.write(16, mol.mass(a) as u64);
        }
    }
    // 1: atom lists
    let lists = atoms_with(&|a| mol.atom_list(a).is_some());
    if !lists.is_empty() {
        emit(w, 1);
        w.write(nbits, lists.len() as u64);
        for &(pos, a) in &lists {
            let list = mol.atom_list(a).unwrap_or(&[]);
            w.write(nbits, pos);
            w.write(8, list.len().min(255) as u64);
            for &z in list.iter().take(255) {
                w.write(8, z as u64);
            }
        }
    }
    // 2: abnormal valences
    let val = atoms_with(&|a| mol.abnormal_valence(a).is_some());
    if !val.is_empty() {
        emit(w, 2);
        w.write(nbits, val.len() as u64);
        for &(pos, a) in &val {
            w.write(nbits, pos);
            w.write(4, mol.abnormal_valence(a).unwrap_or(0) as u64);
        }
    }
    // 3: custom labels
    if mode.encode_atom_custom_labels() {
        let labeled = atoms_with(&|a| mol.custom_label(a).is_some());
        if !labeled.is_empty() {
            emit(w, 3);
            w.write(nbits, labeled.len() as u64);
            for &(pos, a) in &labeled {
                let label = mol.custom_label(a).unwrap_or("");
                w.write(nbits, pos);
                w.write(8, label.len().min(255) as u64);
                for byte in label.bytes().take(255) {
                    w.write(7, (byte & 0x7f) as u64);
                }
            }
        }
    }
    // 4: radicals
    let rad = atoms_with(&|a| mol.radical(a) != crate::molecule::Radical::None);
    if !rad.is_empty() {
        emit(w, 4);
        w.write(nbits, rad.len() as u64);
        for &(pos, a) in &rad {
            w.write(nbits, pos);
            w.write(2, mol.radical(a).code() as u64);
        }
    }
    // 5: selection bitmap
    if mode.encode_atom_selection() && g.atoms.iter().any(|&a| mol.is_selected(a)) {
        emit(w, 5);
        for &a in &g.atoms {
            w.write(1, mol.is_selected(a) as u64);
        }
    }
    // 6/7/8: bond kinds the 2-bit code cannot carry
    let bonds_of_kind = |pred: &dyn Fn(BondKind) -> bool| -> Vec<u64> {
        order
            .iter()
            .enumerate()
            .filter(|&(_, &b)| pred(mol.bond_kind(b)))
            .map(|(i, _)| i as u64)
            .collect()
    };
    let deloc = bonds_of_kind(&|k| k == BondKind::Delocalized);
    if !deloc.is_empty() {
        emit(w, 6);
        w.write(nbits, deloc.len() as u64);
        for &i in &deloc {
            w.write(nbits, i);
        }
    }
    let dative = bonds_of_kind(&|k| k == BondKind::Dative);
    if !dative.is_empty() {
        emit(w, 7);
        w.write(nbits, dative.len() as u64);
        for &i in &dative {
            w.write(nbits, i);
        }
    }
    let rare: Vec<(u64, bool)> = order
        .iter()
        .enumerate()
        .filter(|&(_, &b)| {
            matches!(mol.bond_kind(b), BondKind::Quadruple | BondKind::Quintuple)
        })
        .map(|(i, &b)| (i as u64, mol.bond_kind(b) == BondKind::Quintuple))
        .collect();
    if !rare.is_empty() {
        emit(w, 8);
        w.write(nbits, rare.len() as u64);
        for &(i, quint) in &rare {
            w.write(nbits, i);
            w.write(1, quint as u64);
        }
    }
    // 9/10: query features, only present on fragments
    if mol.is_fragment() {
        let aq = atoms_with(&|a| mol.atom_query_features(a) != 0);
        if !aq.is_empty() {
            emit(w, 9);
            w.write(nbits, aq.len() as u64);
            for &(pos, a) in &aq {
                w.write(nbits, pos);
                w.write(32, mol.atom_query_features(a) as u64);
            }
        }
        let bq: Vec<(u64, u32)> = order
            .iter()
            .enumerate()
            .filter(|&(_, &b)| mol.bond_query_features(b) != 0)
            .map(|(i, &b)| (i as u64, mol.bond_query_features(b)))
            .collect();
        if !bq.is_empty() {
            emit(w, 10);
            w.write(nbits, bq.len() as u64);
            for &(i, q) in &bq {
                w.write(nbits, i);
                w.write(32, q as u64);
            }
        }
    }
    // end of chain
    w.write(1, 0);
}

const COORD_LOG_SCALE: f64 = 16.0;

fn log_encode(v: f64) -> u64 {
    ((v + 1.0).ln() * COORD_LOG_SCALE).round().clamp(0.0, 255.0) as u64
}

pub(crate) fn log_decode(enc: u64) -> f64 {
    (enc as f64 / COORD_LOG_SCALE).exp() - 1.0
}

/// Coordinate side channel. Deltas against the spanning-tree parent,
/// quantized to 8 bits (2D) or 16 bits (3D), with a log-scaled range
/// header. `None` when the molecule carries no geometry.
#[instrument(level = "debug", skip_all)]
pub(crate) fn encode_coordinates<M: StereoView>(
    mol: &M,
    mode: Mode,
    g: &CanonGraph,
    keep_absolute: bool,
) -> Option<String> {
    if mol.dims() == 0 && !mode.force_3d_coordinates() {
        return None;
    }
    let axes = if mol.dims() == 3 || mode.force_3d_coordinates() {
        3
    } else {
        2
    };
    let res: u32 = if axes == 3 { 16 } else { 8 };
    let half = ((1u64 << (res - 1)) - 1) as f64;

    // root deltas are positions divided down so one scale fits everything
    let delta_of = |pos: usize, axis: usize| -> f64 {
        let a = g.atoms[pos];
        match g.from[pos] {
            Some(parent) => mol.coords(a)[axis] - mol.coords(g.atoms[parent])[axis],
            None => mol.coords(a)[axis] / 8.0,
        }
    };
    let mut max_delta = 0f64;
    for pos in 0..g.atoms.len() {
        for axis in 0..axes {
            max_delta = max_delta.max(delta_of(pos, axis).abs());
        }
    }

    let mut w = SymbolWriter::new();
    w.write(1, (axes == 3) as u64);
    w.write(1, keep_absolute as u64);
    let scale_enc = log_encode(max_delta);
    w.write(8, scale_enc);
    let max = log_decode(scale_enc).max(1e-9);
    for pos in 0..g.atoms.len() {
        for axis in 0..axes {
            let d = delta_of(pos, axis).clamp(-max, max);
            let raw = (half + d * half / max).round() as u64;
            w.write(res, raw.min((1 << res) - 1));
        }
    }
    if keep_absolute {
        // average bond length restores the global scale on decode
        let bonds = mol.bond_count().max(1) as f64;
        let mut total = 0f64;
        for b in 0..mol.bond_count() {
            let (x, y) = mol.bond_atoms(b);
            let (px, py) = (mol.coords(x), mol.coords(y));
            total += ((px[0] - py[0]).powi(2)
                + (px[1] - py[1]).powi(2)
                + (px[2] - py[2]).powi(2))
            .sqrt();
        }
        w.write(8, log_encode(total / bonds));
    }
    Some(w.finish())
}

/// Atom-mapping side channel; `None` when no atom is mapped.
#[instrument(level = "debug", skip_all)]
pub(crate) fn encode_mapping<M: StereoView>(mol: &M, g: &CanonGraph) -> Option<String> {
    let max_map = g.atoms.iter().map(|&a| mol.map_no(a)).max().unwrap_or(0);
    if max_map == 0 {
        return None;
    }
    let mixed = g.atoms.iter().any(|&a| mol.map_no(a) != 0 && mol.map_auto(a))
        && g.atoms.iter().any(|&a| mol.map_no(a) != 0 && !mol.map_auto(a));
    let mbits = needed_bits(max_map as u64);
    let mut w = SymbolWriter::new();
    w.write(1, mixed as u64);
    w.write(4, mbits as u64);
    for &a in &g.atoms {
        w.write(mbits, mol.map_no(a) as u64);
        if mixed {
            w.write(1, mol.map_auto(a) as u64);
        }
    }
    Some(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_flushes_msb_first() {
        let mut w = SymbolWriter::new();
        w.write(6, 0); // 'A'
        w.write(6, 27); // 'b'
        assert_eq!(w.finish(), "Ab");
    }

    #[test]
    fn partial_symbol_is_zero_padded() {
        let mut w = SymbolWriter::new();
        w.write(4, 0b1111);
        // 1111 00 -> 60 -> '8'
        assert_eq!(w.finish(), "8");
    }

    #[test]
    fn needed_bits_boundaries() {
        assert_eq!(needed_bits(0), 0);
        assert_eq!(needed_bits(1), 1);
        assert_eq!(needed_bits(7), 3);
        assert_eq!(needed_bits(8), 4);
    }

    #[test]
    fn log_scale_is_monotonic() {
        let a = log_decode(log_encode(0.5));
        let b = log_decode(log_encode(5.0));
        let c = log_decode(log_encode(50.0));
        assert!(a < b && b < c);
        assert!((log_decode(log_encode(0.0))).abs() < 1e-9);
    }
}
