//! Stereo perception: tetrahedral, double-bond and axial parities computed
//! from ranks plus coordinates, pro-parity votes for the tie-breaker, and
//! ESR/meso/pseudo normalization.
//!
//! All parities are expressed relative to the canonical rank order of the
//! substituents, so they are invariant under input relabeling. A molecule
//! decoded from an idcode has its stored parities already in this
//! convention; they are used directly, even when a decoded coordinate
//! stream has been applied, since those coordinates carry no wedges.

use super::{refine, Ctx, Mode, ParityInfo};
use crate::molecule::{BondKind, BondStereo, EsrType, Parity, StereoView};
use itertools::Itertools;
use tracing::{instrument, trace};

const EPS: f64 = 1e-7;

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}
fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
fn triple(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    dot(cross(a, b), c)
}
/// Component of `v` perpendicular to `axis`.
fn perp(v: [f64; 3], axis: [f64; 3]) -> [f64; 3] {
    let d = dot(axis, axis);
    if d < EPS {
        return v;
    }
    let f = dot(v, axis) / d;
    [v[0] - f * axis[0], v[1] - f * axis[1], v[2] - f * axis[2]]
}

/// Neighbor position, lifting 2D wedge bonds out of the plane. A wedge
/// counts only when drawn from the narrow end at `center`.
fn lifted_pos<M: StereoView>(mol: &M, center: usize, nb: usize, bond: usize) -> [f64; 3] {
    let mut p = mol.coords(nb);
    if mol.dims() == 2 && mol.bond_atoms(bond).0 == center {
        match mol.bond_stereo(bond) {
            BondStereo::Up => p[2] += 1.0,
            BondStereo::Down => p[2] -= 1.0,
            _ => {}
        }
    }
    p
}

/// Rigid fragments: connected components over ring bonds and pi bonds.
pub(crate) fn assign_fragments<M: StereoView>(mol: &M, ctx: &mut Ctx) {
    let n = mol.atom_count();
    let mut frag = vec![usize::MAX; n];
    let mut count = 0;
    for start in 0..n {
        if frag[start] != usize::MAX {
            continue;
        }
        frag[start] = count;
        let mut stack = vec![start];
        while let Some(a) = stack.pop() {
            for &(other, bond) in mol.neighbors(a) {
                let rigid = mol.is_ring_bond(bond) || mol.bond_kind(bond).pi_count() > 0;
                if rigid && frag[other] == usize::MAX {
                    frag[other] = count;
                    stack.push(other);
                }
            }
        }
        count += 1;
    }
    ctx.fragment_of = frag;
    ctx.fragment_count = count;
    ctx.meso_fragment = vec![false; count];
}

enum ThEval {
    No,
    /// Exactly one tied substituent pair under the current ranks.
    Tied(usize, usize),
    Val(Parity),
}

/// Tetrahedral stereo center qualification plus geometric evaluation.
fn eval_th<M: StereoView>(mol: &M, mode: Mode, ctx: &Ctx, atom: usize) -> ThEval {
    let z = mol.atomic_num(atom);
    if !matches!(z, 5 | 6 | 7 | 14 | 15 | 16) {
        return ThEval::No;
    }
    let nbrs = mol.neighbors(atom);
    let degree = nbrs.len();
    if !(3..=4).contains(&degree) {
        return ThEval::No;
    }
    if nbrs.iter().any(|&(_, b)| mol.bond_kind(b).pi_count() > 0) {
        return ThEval::No;
    }
    let h = mol.implicit_h(atom);
    if degree + h as usize != 4 {
        // pyramidal lone-pair centers
        let lone_pair_ok = match z {
            7 => mode.assume_chiral_true_nitrogen() || nitrogen_qualifies(mol, atom),
            15 => degree == 3,
            16 => degree == 3 && mol.charge(atom) > 0,
            _ => false,
        };
        if !(degree + (h as usize) == 3 && lone_pair_ok) {
            return ThEval::No;
        }
    } else if z == 6 && mol.charge(atom) > 0 {
        // carbenium
        return ThEval::No;
    } else if z == 7
        && degree < 4
        && !mode.assume_chiral_true_nitrogen()
        && !nitrogen_qualifies(mol, atom)
    {
        // trivalent nitrogen inverts unless blocked; quaternary always counts
        return ThEval::No;
    }
    if h > 1 {
        return ThEval::No;
    }

    // substituent rank ties: none for a real center, exactly one for pro mode
    let mut ties: Option<(usize, usize)> = None;
    for (i, &(a1, _)) in nbrs.iter().enumerate() {
        for &(a2, _) in &nbrs[i + 1..] {
            if ctx.rank[a1] == ctx.rank[a2] {
                if ties.is_some() {
                    return ThEval::No;
                }
                ties = Some((a1, a2));
            }
        }
    }
    if let Some((a1, a2)) = ties {
        return ThEval::Tied(a1, a2);
    }
    ThEval::Val(th_geometry(mol, ctx, atom, None))
}

/// Ring-nitrogen inversion heuristic: a tetrahedral nitrogen is only a
/// stereo center when inversion is blocked.
fn nitrogen_qualifies<M: StereoView>(mol: &M, atom: usize) -> bool {
    mol.degree(atom) == 4
        || mol.charge(atom) > 0
        || mol.atom_ring_size(atom) == 3
        || (mol.is_ring_atom(atom) && mol.ring_bond_count(atom) >= 3)
}

/// Signed-volume parity. `force_first` promotes one atom of a tied pair to
/// the front of its rank class (pro-parity evaluation).
fn th_geometry<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    atom: usize,
    force_first: Option<usize>,
) -> Parity {
    if mol.parities_valid() {
        return mol.th_parity(atom);
    }
    if mol.dims() == 0 {
        return Parity::Unknown;
    }
    let mut ordered: Vec<(u64, usize, usize)> = mol
        .neighbors(atom)
        .iter()
        .map(|&(nb, bond)| {
            let bump = (force_first == Some(nb)) as u64;
            (2 * ctx.rank[nb] as u64 + bump, nb, bond)
        })
        .collect();
    ordered.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    let mut pts: Vec<[f64; 3]> = ordered
        .iter()
        .map(|&(_, nb, bond)| lifted_pos(mol, atom, nb, bond))
        .collect();
    if pts.len() == 3 {
        // implicit hydrogen or lone pair: lowest priority, at the center
        pts.push(mol.coords(atom));
    }
    let vol = triple(
        sub(pts[0], pts[3]),
        sub(pts[1], pts[3]),
        sub(pts[2], pts[3]),
    );
    if vol.abs() < EPS {
        Parity::Unknown
    } else if vol > 0.0 {
        Parity::One
    } else {
        Parity::Two
    }
}

enum EzEval {
    No,
    /// One end carries two substituents tied under the current ranks.
    Tied(usize, usize),
    Val(Parity),
}

/// Reference substituent (highest rank) on one side of a double bond.
fn side_ref<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    end: usize,
    across: usize,
) -> Result<Option<(usize, usize)>, (usize, usize)> {
    let others: Vec<(usize, usize)> = mol
        .neighbors(end)
        .iter()
        .copied()
        .filter(|&(nb, _)| nb != across)
        .collect();
    match others.len() {
        0 => Ok(None),
        1 => Ok(Some(others[0])),
        2 => {
            if ctx.rank[others[0].0] == ctx.rank[others[1].0] {
                Err((others[0].0, others[1].0))
            } else if ctx.rank[others[0].0] > ctx.rank[others[1].0] {
                Ok(Some(others[0]))
            } else {
                Ok(Some(others[1]))
            }
        }
        _ => Ok(None),
    }
}

fn eval_ez<M: StereoView>(mol: &M, ctx: &Ctx, bond: usize) -> EzEval {
    if mol.bond_kind(bond) != BondKind::Double {
        return EzEval::No;
    }
    let rs = mol.bond_ring_size(bond);
    if rs != 0 && rs < 8 {
        // geometry is fixed by the small ring
        return EzEval::No;
    }
    let (a, b) = mol.bond_atoms(bond);
    // cumulated systems are handled from the allene center
    for end in [a, b] {
        let extra_pi = mol
            .neighbors(end)
            .iter()
            .filter(|&&(_, eb)| eb != bond && mol.bond_kind(eb).pi_count() > 0)
            .count();
        if extra_pi != 0 {
            return EzEval::No;
        }
    }
    let ref_a = match side_ref(mol, ctx, a, b) {
        Ok(Some(r)) => r,
        Ok(None) => return EzEval::No,
        Err((x, y)) => return EzEval::Tied(x, y),
    };
    let ref_b = match side_ref(mol, ctx, b, a) {
        Ok(Some(r)) => r,
        Ok(None) => return EzEval::No,
        Err((x, y)) => return EzEval::Tied(x, y),
    };
    if mol.bond_stereo(bond) == BondStereo::Cross {
        return EzEval::Val(Parity::Unknown);
    }
    if mol.parities_valid() {
        return EzEval::Val(mol.ez_parity(bond));
    }
    if mol.dims() == 0 {
        return EzEval::Val(Parity::Unknown);
    }
    let pa = mol.coords(a);
    let pb = mol.coords(b);
    let axis = sub(pb, pa);
    let u = perp(sub(mol.coords(ref_a.0), pa), axis);
    let v = perp(sub(mol.coords(ref_b.0), pb), axis);
    let c = dot(u, v);
    EzEval::Val(if c.abs() < EPS {
        Parity::Unknown
    } else if c > 0.0 {
        Parity::One
    } else {
        Parity::Two
    })
}

/// An allene center: a divalent atom carrying exactly two double bonds.
fn allene_center<M: StereoView>(mol: &M, atom: usize) -> Option<(usize, usize)> {
    let nbrs = mol.neighbors(atom);
    if nbrs.len() != 2 {
        return None;
    }
    let both_double = nbrs
        .iter()
        .all(|&(_, b)| mol.bond_kind(b) == BondKind::Double);
    both_double.then(|| (nbrs[0].0, nbrs[1].0))
}

/// Axial parity across `e1..e2` using the highest-ranked substituent on
/// each end; shared by allene centers and hindered biaryl axes.
fn axial_parity<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    e1: usize,
    e2: usize,
    stored: Parity,
) -> EzEval {
    let r1 = match side_ref(mol, ctx, e1, e2) {
        Ok(Some(r)) => r,
        Ok(None) => return EzEval::No,
        Err((x, y)) => return EzEval::Tied(x, y),
    };
    let r2 = match side_ref(mol, ctx, e2, e1) {
        Ok(Some(r)) => r,
        Ok(None) => return EzEval::No,
        Err((x, y)) => return EzEval::Tied(x, y),
    };
    if mol.parities_valid() {
        return EzEval::Val(stored);
    }
    if mol.dims() == 0 {
        return EzEval::Val(Parity::Unknown);
    }
    let p1 = mol.coords(e1);
    let p2 = mol.coords(e2);
    let axis = sub(p2, p1);
    let u = perp(sub(lifted_pos(mol, e1, r1.0, r1.1), p1), axis);
    let v = perp(sub(lifted_pos(mol, e2, r2.0, r2.1), p2), axis);
    let t = dot(cross(u, v), axis);
    EzEval::Val(if t.abs() < EPS {
        Parity::Unknown
    } else if t > 0.0 {
        Parity::One
    } else {
        Parity::Two
    })
}

/// Hindered single-bond axis heuristic: both ends are ring atoms of
/// different rings, each end has two distinctly ranked ring neighbors, and
/// enough ortho substitution to block rotation.
fn binap_qualifies<M: StereoView>(mol: &M, bond: usize) -> bool {
    if mol.bond_kind(bond) != BondKind::Single || mol.is_ring_bond(bond) {
        return false;
    }
    let (a, b) = mol.bond_atoms(bond);
    let mut substituted_ring_neighbors = 0;
    for (end, across) in [(a, b), (b, a)] {
        if !mol.is_ring_atom(end) {
            return false;
        }
        let ring_others: Vec<usize> = mol
            .neighbors(end)
            .iter()
            .filter(|&&(nb, eb)| nb != across && mol.is_ring_bond(eb))
            .map(|&(nb, _)| nb)
            .collect();
        if ring_others.len() != 2 {
            return false;
        }
        substituted_ring_neighbors += ring_others
            .iter()
            .filter(|&&nb| mol.degree(nb) >= 3)
            .count();
    }
    substituted_ring_neighbors >= 2
}

/// One full parity discovery pass over all atoms and bonds with the current
/// ranks. When `record_symmetric` is set (pre-tiebreak), centers blocked by
/// a single fragment-internal tie are remembered as pseudo candidates.
#[instrument(level = "trace", skip_all)]
pub(crate) fn calc_all_parities<M: StereoView>(
    mol: &M,
    mode: Mode,
    ctx: &mut Ctx,
    record_symmetric: bool,
) {
    if record_symmetric {
        // only ties that survive to the stable partition mark candidates
        ctx.th_symmetric.fill(false);
        ctx.ez_symmetric.fill(false);
    }
    for atom in 0..mol.atom_count() {
        let mut info = ParityInfo::default();
        let eval = if let Some((e1, e2)) = allene_center(mol, atom) {
            info.axial = true;
            match axial_parity(mol, ctx, e1, e2, mol.th_parity(atom)) {
                EzEval::No => ThEval::No,
                EzEval::Tied(x, y) => ThEval::Tied(x, y),
                EzEval::Val(p) => ThEval::Val(p),
            }
        } else {
            eval_th(mol, mode, ctx, atom)
        };
        match eval {
            ThEval::Val(p) => {
                info.parity = p;
                info.esr = mol.atom_esr(atom);
                // a qualified center with geometry that resolves nothing
                if p == Parity::Unknown && mol.dims() != 0 {
                    ctx.stereo_problem[atom] = true;
                }
            }
            ThEval::Tied(x, y) => {
                if record_symmetric && ctx.fragment_of[x] == ctx.fragment_of[y] {
                    ctx.th_symmetric[atom] = true;
                }
                info.axial = false;
            }
            ThEval::No => info.axial = false,
        }
        ctx.th[atom] = info;
    }
    for bond in 0..mol.bond_count() {
        let mut info = ParityInfo::default();
        let eval = if binap_qualifies(mol, bond) {
            let (a, b) = mol.bond_atoms(bond);
            info.axial = true;
            axial_parity(mol, ctx, a, b, mol.ez_parity(bond))
        } else {
            eval_ez(mol, ctx, bond)
        };
        match eval {
            EzEval::Val(p) => {
                info.parity = p;
                info.esr = mol.bond_esr(bond);
            }
            EzEval::Tied(x, y) => {
                if record_symmetric && ctx.fragment_of[x] == ctx.fragment_of[y] {
                    ctx.ez_symmetric[bond] = true;
                }
                info.axial = false;
            }
            EzEval::No => info.axial = false,
        }
        ctx.ez[bond] = info;
    }
}

/// Meso collaborator. When every definite stereo center belongs to a
/// constitutionally equivalent class whose parities cancel (equal counts of
/// `One` and `Two` under the pre-parity ranks), the molecule is one achiral
/// structure in two drawings; the fragments holding those centers are
/// marked.
fn detect_meso<M: StereoView>(mol: &M, ctx: &mut Ctx) {
    let mut centers: Vec<(u32, Parity, usize)> = (0..mol.atom_count())
        .filter(|&a| ctx.th[a].parity.is_definite())
        .map(|a| (ctx.base_rank[a], ctx.th[a].parity, a))
        .collect();
    if centers.len() < 2 || centers.len() % 2 != 0 {
        return;
    }
    centers.sort_unstable_by_key(|&(r, _, _)| r);
    let paired = centers.chunk_by(|a, b| a.0 == b.0).all(|class| {
        let ones = class.iter().filter(|c| c.1 == Parity::One).count();
        class.len() % 2 == 0 && 2 * ones == class.len()
    });
    if paired {
        for &(_, _, a) in &centers {
            ctx.meso_fragment[ctx.fragment_of[a]] = true;
        }
    }
}

/// ESR normalization: canonical renumbering of AND/OR groups plus the
/// deferred group parity normalization (highest-ranked member becomes
/// `Parity::Two`, the rest follow by inversion flags).
pub(crate) fn normalize_esr_groups<M: StereoView>(mol: &M, mode: Mode, ctx: &mut Ctx) {
    // racemic single-OR-group molecules encode as AND unless distinguished
    if !mode.distinguish_racemic_or_groups() {
        let or_only = ctx
            .th
            .iter()
            .chain(ctx.ez.iter().filter(|i| i.axial))
            .filter(|i| i.parity.is_definite())
            .all(|i| i.esr.kind == EsrType::Or || i.esr.kind == EsrType::Abs);
        let any_or = ctx.th.iter().any(|i| i.esr.kind == EsrType::Or && i.parity.is_definite());
        if or_only && any_or {
            for info in ctx.th.iter_mut().chain(ctx.ez.iter_mut()) {
                if info.esr.kind == EsrType::Or {
                    info.esr.kind = EsrType::And;
                }
            }
        }
    }

    // members: (kind, old group) -> [(rank, atom? bond?)]
    let mut groups: Vec<(u8, u8, u32)> = Vec::new(); // (kind, old group, min rank)
    let mut note = |kind: EsrType, group: u8, rank: u32| {
        if kind == EsrType::Abs {
            return;
        }
        if let Some(e) = groups
            .iter_mut()
            .find(|g| g.0 == kind.code() && g.1 == group)
        {
            e.2 = e.2.min(rank);
        } else {
            groups.push((kind.code(), group, rank));
        }
    };
    for (a, info) in ctx.th.iter().enumerate() {
        if info.parity.is_definite() {
            note(info.esr.kind, info.esr.group, ctx.rank[a]);
        }
    }
    for (b, info) in ctx.ez.iter().enumerate() {
        if info.axial && info.parity.is_definite() {
            let (x, y) = mol.bond_atoms(b);
            note(info.esr.kind, info.esr.group, ctx.rank[x].max(ctx.rank[y]));
        }
    }
    groups.sort_unstable_by_key(|&(kind, _, min_rank)| (kind, std::cmp::Reverse(min_rank)));
    let renumber = |kind: EsrType, old: u8, groups: &[(u8, u8, u32)]| -> u8 {
        groups
            .iter()
            .filter(|g| g.0 == kind.code())
            .position(|g| g.1 == old)
            .unwrap_or(0) as u8
    };
    for info in ctx.th.iter_mut() {
        if info.esr.is_grouped() && info.parity.is_definite() {
            info.esr.group = renumber(info.esr.kind, info.esr.group, &groups);
        }
    }
    for info in ctx.ez.iter_mut() {
        if info.axial && info.esr.is_grouped() && info.parity.is_definite() {
            info.esr.group = renumber(info.esr.kind, info.esr.group, &groups);
        }
    }

    // group parity normalization
    for &(kind_code, _, _) in &groups {
        let kind = EsrType::from_code(kind_code);
        let group_numbers: Vec<u8> = groups
            .iter()
            .filter(|g| g.0 == kind_code)
            .enumerate()
            .map(|(i, _)| i as u8)
            .collect();
        for g in group_numbers {
            let mut top: Option<(u32, Parity)> = None;
            for (a, info) in ctx.th.iter().enumerate() {
                if info.esr.kind == kind && info.esr.group == g && info.parity.is_definite() {
                    let r = ctx.rank[a];
                    if top.is_none_or(|(tr, _)| r > tr) {
                        top = Some((r, info.parity));
                    }
                }
            }
            for (b, info) in ctx.ez.iter().enumerate() {
                if info.axial && info.esr.kind == kind && info.esr.group == g && info.parity.is_definite() {
                    let (x, y) = mol.bond_atoms(b);
                    let r = ctx.rank[x].max(ctx.rank[y]);
                    if top.is_none_or(|(tr, _)| r > tr) {
                        top = Some((r, info.parity));
                    }
                }
            }
            if let Some((_, p)) = top {
                if p == Parity::One {
                    for info in ctx.th.iter_mut() {
                        if info.esr.kind == kind && info.esr.group == g {
                            info.parity = info.parity.flipped();
                        }
                    }
                    for info in ctx.ez.iter_mut() {
                        if info.axial && info.esr.kind == kind && info.esr.group == g {
                            info.parity = info.parity.flipped();
                        }
                    }
                }
            }
        }
    }
}

/// Parity discovery and normalization rounds, interleaved with refinement,
/// until the ranks stop improving. Pre-tiebreak this also runs the meso
/// collaborator (rank pairing needs symmetry ranks).
#[instrument(level = "debug", skip_all)]
pub(crate) fn stereo_rounds<M: StereoView>(mol: &M, mode: Mode, ctx: &mut Ctx) {
    let first_pass = ctx.base_rank.is_empty();
    if first_pass {
        ctx.base_rank = ctx.rank.clone();
    }
    loop {
        calc_all_parities(mol, mode, ctx, first_pass);
        normalize_esr_groups(mol, mode, ctx);
        let th_codes: Vec<u64> = ctx
            .th
            .iter()
            .map(|i| ((i.parity.code() as u64) << 1) | i.axial as u64)
            .collect();
        let ez_codes: Vec<u64> = ctx.ez.iter().map(|i| i.parity.code() as u64).collect();
        let changed = refine::refine_step_with(mol, ctx, |atom, rank, bv| {
            bv.add(4, th_codes[atom]);
            let mut bonds: Vec<u64> = mol
                .neighbors(atom)
                .iter()
                .map(|&(other, bond)| (rank[other] as u64) << 2 | ez_codes[bond])
                .collect();
            bonds.sort_unstable_by(|a, b| b.cmp(a));
            for slot in 0..bonds.len().max(1).min(16) {
                bv.add(34, bonds.get(slot).copied().unwrap_or(0));
            }
        });
        if !changed {
            break;
        }
        trace!(ranks = ctx.rank_count, "stereo information split ranks");
    }
    if first_pass {
        detect_meso(mol, ctx);
    }
}

/// Pro-parity votes for one heterotopicity round of the tie-breaker.
/// Returns `None` when no center produced a vote.
pub(crate) fn hetero_votes<M: StereoView>(mol: &M, mode: Mode, ctx: &Ctx) -> Option<Vec<Vec<u32>>> {
    let mut votes: Vec<Vec<u32>> = vec![Vec::new(); mol.atom_count()];
    let mut any = false;

    for atom in 0..mol.atom_count() {
        let tied = match eval_th(mol, mode, ctx, atom) {
            ThEval::Tied(x, y) => (x, y),
            _ => continue,
        };
        let (x, y) = tied;
        let p = th_geometry(mol, ctx, atom, Some(x));
        if !p.is_definite() {
            continue;
        }
        let center = ctx.rank[atom];
        let (winner, loser) = if p == Parity::One { (x, y) } else { (y, x) };
        votes[winner].push(2 * center + 1);
        votes[loser].push(2 * center);
        any = true;
    }
    for bond in 0..mol.bond_count() {
        let (x, y) = match eval_ez(mol, ctx, bond) {
            EzEval::Tied(x, y) => (x, y),
            _ => continue,
        };
        // evaluate with x promoted within its rank class
        let (a, b) = mol.bond_atoms(bond);
        let p = ez_pro_geometry(mol, ctx, bond, a, b, x);
        if !p.is_definite() {
            continue;
        }
        let r = ctx.rank[a].max(ctx.rank[b]);
        let (winner, loser) = if p == Parity::One { (x, y) } else { (y, x) };
        votes[winner].push(2 * r + 1);
        votes[loser].push(2 * r);
        any = true;
    }
    any.then_some(votes)
}

fn ez_pro_geometry<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    _bond: usize,
    a: usize,
    b: usize,
    forced: usize,
) -> Parity {
    if mol.dims() == 0 {
        return Parity::Unknown;
    }
    // which end carries the tie
    let (tied_end, other_end) = if mol.neighbors(a).iter().any(|&(nb, _)| nb == forced) {
        (a, b)
    } else {
        (b, a)
    };
    let ref_other = match side_ref(mol, ctx, other_end, tied_end) {
        Ok(Some(r)) => r,
        _ => return Parity::None,
    };
    let pa = mol.coords(tied_end);
    let pb = mol.coords(other_end);
    let axis = sub(pb, pa);
    let u = perp(sub(mol.coords(forced), pa), axis);
    let v = perp(sub(mol.coords(ref_other.0), pb), axis);
    let c = dot(u, v);
    if c.abs() < EPS {
        Parity::Unknown
    } else if c > 0.0 {
        Parity::One
    } else {
        Parity::Two
    }
}

/// After the rank is total: classify parities that only exist relative to a
/// partner in the same rigid fragment, clear meaningless singletons, and
/// normalize each fragment so its highest-ranked pseudo feature is
/// `Parity::Two`.
#[instrument(level = "debug", skip_all)]
pub(crate) fn pseudo_parity_pass<M: StereoView>(mol: &M, mode: Mode, ctx: &mut Ctx) {
    for f in 0..ctx.fragment_count {
        // (rank, atom feature?, index)
        let mut feats: Vec<(u32, bool, usize)> = Vec::new();
        for a in 0..mol.atom_count() {
            if ctx.fragment_of[a] == f && ctx.th_symmetric[a] && ctx.th[a].parity.is_set() {
                feats.push((ctx.rank[a], true, a));
            }
        }
        for b in 0..mol.bond_count() {
            if !ctx.ez_symmetric[b] || !ctx.ez[b].parity.is_set() {
                continue;
            }
            let (x, y) = mol.bond_atoms(b);
            if ctx.fragment_of[x] == f {
                feats.push((ctx.rank[x].max(ctx.rank[y]), false, b));
            }
        }
        if feats.is_empty() {
            continue;
        }
        if feats.len() == 1 {
            // a single relative configuration carries no information
            let (_, is_atom, i) = feats[0];
            if is_atom {
                ctx.th[i] = ParityInfo::default();
            } else {
                ctx.ez[i] = ParityInfo::default();
            }
            continue;
        }
        let any_definite = feats.iter().any(|&(_, is_atom, i)| {
            if is_atom {
                ctx.th[i].parity.is_definite()
            } else {
                ctx.ez[i].parity.is_definite()
            }
        });
        if !any_definite {
            for &(_, is_atom, i) in &feats {
                if is_atom {
                    ctx.th[i].parity = Parity::Unknown;
                } else {
                    ctx.ez[i].parity = Parity::Unknown;
                }
            }
            continue;
        }
        for &(_, is_atom, i) in &feats {
            if is_atom {
                ctx.th[i].pseudo = true;
            } else {
                ctx.ez[i].pseudo = true;
            }
        }
        feats.sort_unstable_by_key(|&(rank, _, _)| std::cmp::Reverse(rank));
        let top = feats[0];
        let top_parity = if top.1 {
            ctx.th[top.2].parity
        } else {
            ctx.ez[top.2].parity
        };
        if top_parity == Parity::One {
            for &(_, is_atom, i) in &feats {
                if is_atom {
                    ctx.th[i].parity = ctx.th[i].parity.flipped();
                } else {
                    ctx.ez[i].parity = ctx.ez[i].parity.flipped();
                }
            }
        }
        if mode.create_pseudo_stereo_groups() {
            for (g, &(_, is_atom, i)) in feats.iter().enumerate() {
                let group = g.min(255) as u8;
                if is_atom {
                    ctx.th[i].esr.group = group;
                } else {
                    ctx.ez[i].esr.group = group;
                }
            }
        }
    }
}

/// Aggregate the final parities into one molecule-level classification.
pub(crate) fn classify_chirality(ctx: &Ctx) -> super::ChiralityClass {
    use super::ChiralityClass::*;
    let mut abs_known = 0usize;
    let mut abs_unknown = 0usize;
    let mut and_groups: Vec<u8> = Vec::new();
    let mut or_groups: Vec<u8> = Vec::new();

    let mut tally = |info: &ParityInfo| {
        if !info.parity.is_set() || info.pseudo {
            return;
        }
        match info.esr.kind {
            EsrType::And => and_groups.push(info.esr.group),
            EsrType::Or => or_groups.push(info.esr.group),
            _ => {
                if info.parity.is_definite() {
                    abs_known += 1;
                } else {
                    abs_unknown += 1;
                }
            }
        }
    };
    for info in &ctx.th {
        tally(info);
    }
    for info in ctx.ez.iter().filter(|i| i.axial) {
        tally(info);
    }
    let and_count = and_groups.iter().unique().count();
    let or_count = or_groups.iter().unique().count();
    let grouped = !and_groups.is_empty() || !or_groups.is_empty();
    let total = abs_known + abs_unknown + and_groups.len() + or_groups.len();
    let meso = ctx.meso_fragment.iter().any(|&m| m);

    if total == 0 {
        return NotChiral;
    }
    if meso && abs_unknown == 0 && !grouped {
        return Meso;
    }
    if grouped {
        if (or_count != 0 && and_count != 0) || abs_known + abs_unknown != 0 {
            return Diastereomers;
        }
        if and_count == 1 {
            return Racemic;
        }
        if and_count > 1 {
            return Epimers;
        }
        // OR groups only: one unknown enantiomer, or a mixture of them
        if or_count == 1 {
            return UnknownEnantiomer;
        }
        return Diastereomers;
    }
    if abs_unknown != 0 {
        return UnknownEnantiomer;
    }
    KnownEnantiomer
}
