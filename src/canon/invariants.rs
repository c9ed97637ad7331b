//! Initial invariant keys: everything about an atom that survives relabeling.
//!
//! The base pass packs the static per-atom fields, most significant first.
//! If refinement over those leaves ties, three escalating fallback passes
//! fold in neighbor-pair data, each one only when the previous was not
//! enough to tell all atoms apart.

use super::base_value::BaseValue;
use super::{refine, Ctx, Mode};
use crate::molecule::{RingView, StereoView};
use tracing::instrument;

/// FNV-1a, used to fold variable-length custom labels into a fixed field.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

const LIST_SLOTS: usize = 16;

/// Build the invariant base values, refine, and apply the fallback passes
/// until either all atoms are distinguished or the invariants are exhausted.
#[instrument(level = "debug", skip_all)]
pub(crate) fn initial_ranks<M: StereoView>(mol: &M, mode: Mode, ctx: &mut Ctx) {
    let n = mol.atom_count();
    let mut base = vec![BaseValue::new(); n];
    for (atom, bv) in base.iter_mut().enumerate() {
        let any = mol.atom_list(atom).is_some();
        bv.add(8, if any { 6 } else { mol.atomic_num(atom) } as u64);
        bv.add(8, mol.mass(atom).min(255) as u64);
        bv.add(2, pi_electrons(mol, atom) as u64);
        bv.add(4, mol.degree(atom).min(15) as u64);
        bv.add(4, (mol.charge(atom) as i16 + 8).clamp(0, 15) as u64);
        bv.add(5, mol.atom_ring_size(atom) as u64);
        bv.add(4, mol.abnormal_valence(atom).map_or(0, |v| v as u64 + 1).min(15));
        bv.add(2, mol.radical(atom).code() as u64);
        if mol.is_fragment() {
            bv.add(32, mol.atom_query_features(atom) as u64);
        }
        if mode.consider_free_valence() {
            bv.add(4, mol.implicit_h(atom).min(15) as u64);
        }
        if mode.encode_atom_custom_labels() {
            let h = mol.custom_label(atom).map_or(0, |l| fnv1a(l.as_bytes()));
            bv.add(32, h as u64);
        }
        if mode.encode_atom_selection() {
            bv.add(1, mol.is_selected(atom) as u64);
        }
    }
    ctx.rank_count = refine::consolidate(&base, &mut ctx.rank);
    refine::refine(mol, ctx);

    let max_degree = ctx.max_degree;

    // fallback (a): neighbor rank paired with the bond's smallest ring size
    if ctx.rank_count < n {
        refine::refine_step_with(mol, ctx, |atom, rank, bv| {
            let mut pairs: Vec<u64> = mol
                .neighbors(atom)
                .iter()
                .map(|&(other, bond)| {
                    ((rank[other] as u64) << 5) | mol.bond_ring_size(bond) as u64
                })
                .collect();
            pairs.sort_unstable_by(|a, b| b.cmp(a));
            for slot in 0..max_degree {
                bv.add(40, pairs.get(slot).copied().unwrap_or(0));
            }
        });
    }

    // fallback (b): wildcard atom-list contents
    if ctx.rank_count < n && (0..n).any(|a| mol.atom_list(a).is_some()) {
        refine::refine_step_with(mol, ctx, |atom, _, bv| {
            let mut sorted: Vec<u8> = mol.atom_list(atom).unwrap_or(&[]).to_vec();
            sorted.sort_unstable();
            for slot in 0..LIST_SLOTS {
                bv.add(8, sorted.get(slot).copied().unwrap_or(0) as u64);
            }
        });
    }

    // fallback (c): neighbor rank paired with the bond's query features
    if ctx.rank_count < n && mol.is_fragment() {
        refine::refine_step_with(mol, ctx, |atom, rank, bv| {
            let mut pairs: Vec<u64> = mol
                .neighbors(atom)
                .iter()
                .map(|&(other, bond)| {
                    ((rank[other] as u64) << 32) | mol.bond_query_features(bond) as u64
                })
                .collect();
            pairs.sort_unstable_by(|a, b| b.cmp(a));
            for slot in 0..max_degree {
                bv.add(64, pairs.get(slot).copied().unwrap_or(0));
            }
        });
    }
}

fn pi_electrons<M: RingView>(mol: &M, atom: usize) -> u8 {
    mol.neighbors(atom)
        .iter()
        .map(|&(_, bond)| mol.bond_kind(bond).pi_count())
        .sum::<u8>()
        .min(3)
}
