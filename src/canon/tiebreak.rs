//! Tie-breaking: turns the stable symmetry partition into a total order.
//!
//! Each round first tries to split ranks on stereo heterotopicity using
//! pro-parity votes, which keeps enantiotopic and diastereotopic atoms
//! apart by chemistry rather than by fiat. Only when no vote splits
//! anything is one atom of the lowest tied rank promoted arbitrarily; the
//! choice is deterministic, so equal graphs still canonicalize equally.

use super::{refine, stereo, Ctx, Mode};
use crate::molecule::StereoView;
use tracing::{debug, instrument, trace};

#[instrument(level = "debug", skip_all)]
pub(crate) fn break_ties<M: StereoView>(mol: &M, mode: Mode, ctx: &mut Ctx) {
    let n = mol.atom_count();
    while ctx.rank_count < n {
        ctx.round += 1;

        if mode.consider_stereoheterotopicity() && !mode.neglect_any_stereo() {
            if let Some(votes) = stereo::hetero_votes(mol, mode, ctx) {
                let width = votes.iter().map(Vec::len).max().unwrap_or(0);
                let mut sorted: Vec<Vec<u32>> = votes;
                for v in &mut sorted {
                    v.sort_unstable_by(|a, b| b.cmp(a));
                }
                let changed = refine::refine_step_with(mol, ctx, |atom, _rank, bv| {
                    for slot in 0..width {
                        bv.add(32, sorted[atom].get(slot).copied().unwrap_or(0) as u64);
                    }
                });
                if changed {
                    trace!(round = ctx.round, ranks = ctx.rank_count, "heterotopicity split");
                    stereo::stereo_rounds(mol, mode, ctx);
                    continue;
                }
            }
        }

        // promote the first atom of the lowest tied rank
        let mut lowest: Option<(u32, usize)> = None;
        for rank in 1..=ctx.rank_count as u32 {
            let mut members = (0..n).filter(|&a| ctx.rank[a] == rank);
            let first = members.next();
            if members.next().is_some() {
                lowest = first.map(|a| (rank, a));
                break;
            }
        }
        let Some((rank, chosen)) = lowest else {
            break;
        };
        trace!(round = ctx.round, rank, atom = chosen, "arbitrary promotion");
        let changed = refine::refine_step_with(mol, ctx, |atom, _rank, bv| {
            bv.add(1, (atom == chosen) as u64);
        });
        debug_assert!(changed);
        if !changed {
            break;
        }
        if !mode.neglect_any_stereo() {
            stereo::stereo_rounds(mol, mode, ctx);
        }
    }
    debug!(rounds = ctx.round, "rank is total");
}
