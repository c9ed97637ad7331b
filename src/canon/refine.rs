//! Iterative partition refinement over canonical ranks.
//!
//! One pass rebuilds every atom's key from its current rank plus the sorted
//! multiset of neighbor ranks, then re-numbers. Repeating to a fixed point
//! is standard 1-round color refinement; the rank count is bounded by the
//! atom count and never decreases, so termination is guaranteed.

use super::base_value::BaseValue;
use super::Ctx;
use crate::molecule::{BondKind, GraphView};
use smallvec::SmallVec;
use tracing::{instrument, trace};

/// Assign 1-based ranks from the lexicographic order of `base`; equal values
/// share a rank. Returns the number of distinct ranks.
pub(crate) fn consolidate(base: &[BaseValue], rank: &mut [u32]) -> usize {
    let mut order: Vec<usize> = (0..base.len()).collect();
    order.sort_unstable_by(|&i, &j| base[i].cmp(&base[j]));
    let mut current = 0u32;
    let mut prev: Option<usize> = None;
    for &i in &order {
        if prev.is_none_or(|p| base[p] != base[i]) {
            current += 1;
        }
        rank[i] = current;
        prev = Some(i);
    }
    current as usize
}

/// Refine to a fixed point. Returns the final number of distinct ranks.
#[instrument(level = "trace", skip_all)]
pub(crate) fn refine<M: GraphView>(mol: &M, ctx: &mut Ctx) -> usize {
    let n = mol.atom_count();
    let mut base = vec![BaseValue::new(); n];
    loop {
        for (atom, bv) in base.iter_mut().enumerate() {
            bv.clear();
            bv.add(32, ctx.rank[atom] as u64);
            let mut nbr: SmallVec<u64, 8> = mol
                .neighbors(atom)
                .iter()
                .map(|&(other, bond)| {
                    let double = mol.bond_kind(bond) == BondKind::Double;
                    2 * ctx.rank[other] as u64 + double as u64
                })
                .collect();
            nbr.sort_unstable_by(|a, b| b.cmp(a));
            for slot in 0..ctx.max_degree {
                bv.add(32, nbr.get(slot).copied().unwrap_or(0));
            }
        }
        let count = consolidate(&base, &mut ctx.rank);
        ctx.round += 1;
        trace!(round = ctx.round, ranks = count, "refinement pass");
        debug_assert!(count >= ctx.rank_count);
        if count == ctx.rank_count {
            return count;
        }
        ctx.rank_count = count;
    }
}

/// Fold per-atom extra information (keyed after the current rank) into a
/// single consolidation, then re-refine if anything split. Because the rank
/// leads the key, classes can only ever split. The closure receives the
/// pre-step rank snapshot. Returns true on progress.
pub(crate) fn refine_step_with<M, F>(mol: &M, ctx: &mut Ctx, extra: F) -> bool
where
    M: GraphView,
    F: Fn(usize, &[u32], &mut BaseValue),
{
    let n = mol.atom_count();
    let snapshot = ctx.rank.clone();
    let mut base = vec![BaseValue::new(); n];
    for (atom, bv) in base.iter_mut().enumerate() {
        bv.add(32, snapshot[atom] as u64);
        extra(atom, &snapshot, bv);
    }
    let count = consolidate(&base, &mut ctx.rank);
    debug_assert!(count >= ctx.rank_count);
    if count > ctx.rank_count {
        ctx.rank_count = count;
        refine(mol, ctx);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Bond, Molecule};

    fn chain(len: usize) -> Molecule {
        let mut mol = Molecule::new();
        let atoms: Vec<_> = (0..len).map(|_| mol.add_atom(Atom::new(6))).collect();
        for w in atoms.windows(2) {
            mol.add_bond(w[0], w[1], Bond::single());
        }
        mol.finalize();
        mol
    }

    #[test]
    fn chain_refines_to_symmetric_ranks() {
        let mol = chain(5);
        let mut ctx = Ctx::new_for_tests(&mol);
        let count = refine(&mol, &mut ctx);
        // pentane: two symmetric pairs plus the middle atom
        assert_eq!(count, 3);
        assert_eq!(ctx.rank[0], ctx.rank[4]);
        assert_eq!(ctx.rank[1], ctx.rank[3]);
        assert_ne!(ctx.rank[0], ctx.rank[2]);
    }

    #[test]
    fn rank_count_is_monotonic() {
        let mol = chain(7);
        let mut ctx = Ctx::new_for_tests(&mol);
        let mut last = ctx.rank_count;
        for _ in 0..4 {
            let count = refine(&mol, &mut ctx);
            assert!(count >= last);
            last = count;
        }
    }
}
