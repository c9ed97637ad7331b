//! CIP priority engine: hierarchical digraphs with phantom duplicate
//! nodes, compared subtree against subtree, used to translate canonical
//! parities into R/S and E/Z descriptors.
//!
//! Atomic numbers are doubled (`z2`) so a delocalized bond can duplicate
//! with the mean of its two end atoms without fractions.

use super::{CipDescriptor, Ctx};
use crate::atom_info::ATOM_DATA;
use crate::molecule::{BondKind, Parity, StereoView};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{instrument, warn};

/// Digraph depth cap. Real molecules resolve long before this; hitting it
/// means the symmetric substructure is too large to rank.
const MAX_LEVELS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CipError {
    #[error("substituent digraph at atom {root} exceeded {MAX_LEVELS} spheres")]
    GraphTooLarge { root: usize },
}

#[derive(Clone, Copy)]
struct CipNode {
    /// `usize::MAX` for phantom duplicates, which are never expanded.
    atom: usize,
    z2: u32,
    mass: u16,
    /// Parity code of the bond this node was entered through.
    ez: u8,
    /// Stored tetrahedral parity code of the atom.
    th: u8,
    parent: usize,
}

fn effective_mass(z: u8, isotope: u16) -> u16 {
    if isotope != 0 {
        isotope
    } else {
        ATOM_DATA[z as usize].mass.round() as u16
    }
}

fn phantom(z2: u32, parent: usize) -> CipNode {
    CipNode {
        atom: usize::MAX,
        z2,
        mass: 0,
        ez: 0,
        th: 0,
        parent,
    }
}

struct Digraph {
    levels: Vec<Vec<CipNode>>,
}

impl Digraph {
    /// One substituent branch of `root`, entered through `first`.
    fn grow<M: StereoView>(
        mol: &M,
        ctx: &Ctx,
        root: usize,
        first: usize,
    ) -> Result<Self, CipError> {
        let mut levels = Vec::new();
        let seed = CipNode {
            atom: first,
            z2: 2 * mol.atomic_num(first) as u32,
            mass: effective_mass(mol.atomic_num(first), mol.mass(first)),
            ez: mol
                .bond_between(root, first)
                .map_or(0, |b| ctx.ez[b].parity.code()),
            th: ctx.th[first].parity.code(),
            parent: usize::MAX,
        };
        levels.push(vec![seed]);
        loop {
            let last = levels.len() - 1;
            let mut next: Vec<CipNode> = Vec::new();
            for (pi, node) in levels[last].iter().enumerate() {
                if node.atom == usize::MAX {
                    continue;
                }
                let came_from = Self::ancestor_atom(&levels, last, pi, root);
                for &(nb, bond) in mol.neighbors(node.atom) {
                    let kind = mol.bond_kind(bond);
                    let (nb_z2, duplicate_z2) = match kind {
                        BondKind::Delocalized => {
                            let z2 = mol.atomic_num(node.atom) as u32 + mol.atomic_num(nb) as u32;
                            (2 * mol.atomic_num(nb) as u32, z2)
                        }
                        _ => {
                            let z2 = 2 * mol.atomic_num(nb) as u32;
                            (z2, z2)
                        }
                    };
                    // pi bonds duplicate the far atom on this side
                    let dup_count = match kind {
                        BondKind::Delocalized => 1,
                        k => k.pi_count() as usize,
                    };
                    for _ in 0..dup_count {
                        next.push(phantom(duplicate_z2, pi));
                    }
                    if nb == came_from {
                        continue;
                    }
                    if Self::in_ancestry(&levels, last, pi, nb) || nb == root {
                        // ring closure: duplicate, do not re-enter
                        next.push(phantom(nb_z2, pi));
                    } else {
                        next.push(CipNode {
                            atom: nb,
                            z2: nb_z2,
                            mass: effective_mass(mol.atomic_num(nb), mol.mass(nb)),
                            ez: ctx.ez[bond].parity.code(),
                            th: ctx.th[nb].parity.code(),
                            parent: pi,
                        });
                    }
                }
                for _ in 0..mol.implicit_h(node.atom) {
                    next.push(phantom(2, pi));
                }
            }
            if next.is_empty() {
                return Ok(Digraph { levels });
            }
            if levels.len() == MAX_LEVELS {
                return Err(CipError::GraphTooLarge { root });
            }
            levels.push(next);
        }
    }

    fn ancestor_atom(levels: &[Vec<CipNode>], level: usize, index: usize, root: usize) -> usize {
        if level == 0 {
            return root;
        }
        levels[level - 1][levels[level][index].parent].atom
    }

    fn in_ancestry(levels: &[Vec<CipNode>], level: usize, index: usize, atom: usize) -> bool {
        let mut l = level;
        let mut i = index;
        loop {
            if levels[l][i].atom == atom {
                return true;
            }
            if l == 0 {
                return false;
            }
            i = levels[l][i].parent;
            l -= 1;
        }
    }

    /// Indices of one node's children in the next level. Phantoms are
    /// never expanded, so their child list is always empty.
    fn children(&self, level: usize, index: usize) -> Vec<usize> {
        self.levels
            .get(level + 1)
            .map(|nodes| {
                nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| n.parent == index)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One hierarchical comparison pass: node keys first, then each node's
/// children sorted descending under this same ordering and compared
/// element by element; when a shared prefix ties, the longer child list
/// outranks the shorter.
fn cmp_subtree(
    a: &Digraph,
    (al, ai): (usize, usize),
    b: &Digraph,
    (bl, bi): (usize, usize),
    key: fn(&CipNode) -> u64,
) -> Ordering {
    let ord = key(&a.levels[al][ai]).cmp(&key(&b.levels[bl][bi]));
    if ord != Ordering::Equal {
        return ord;
    }
    let mut ac = a.children(al, ai);
    let mut bc = b.children(bl, bi);
    ac.sort_by(|&x, &y| cmp_subtree(a, (al + 1, y), a, (al + 1, x), key));
    bc.sort_by(|&x, &y| cmp_subtree(b, (bl + 1, y), b, (bl + 1, x), key));
    for (&x, &y) in ac.iter().zip(&bc) {
        let ord = cmp_subtree(a, (al + 1, x), b, (bl + 1, y), key);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ac.len().cmp(&bc.len())
}

/// CIP comparison of two substituents of `root`. Atomic numbers decide
/// over the whole hierarchical digraph first; a full tie escalates
/// through isotope mass, then double-bond parities, then center
/// parities. `Ok(None)` means the branches are constitutionally and
/// configurationally identical.
pub(crate) fn compare_substituents<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    root: usize,
    via_a: usize,
    via_b: usize,
) -> Result<Option<Ordering>, CipError> {
    let a = Digraph::grow(mol, ctx, root, via_a)?;
    let b = Digraph::grow(mol, ctx, root, via_b)?;
    let keys: [fn(&CipNode) -> u64; 4] = [
        |n: &CipNode| n.z2 as u64,
        |n: &CipNode| ((n.z2 as u64) << 16) | n.mass as u64,
        |n: &CipNode| ((n.z2 as u64) << 18) | ((n.mass as u64) << 2) | n.ez as u64,
        |n: &CipNode| {
            ((n.z2 as u64) << 20) | ((n.mass as u64) << 4) | ((n.ez as u64) << 2) | n.th as u64
        },
    ];
    for key in keys {
        let ord = cmp_subtree(&a, (0, 0), &b, (0, 0), key);
        if ord != Ordering::Equal {
            return Ok(Some(ord));
        }
    }
    Ok(None)
}

/// Substituents of `center`, CIP-highest first. `Ok(None)` when two
/// branches cannot be distinguished.
fn cip_order<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    center: usize,
    subs: &[usize],
) -> Result<Option<Vec<usize>>, CipError> {
    let mut out = subs.to_vec();
    // insertion sort so every pair goes through the comparator
    for i in 1..out.len() {
        let mut j = i;
        while j > 0 {
            match compare_substituents(mol, ctx, center, out[j - 1], out[j])? {
                Some(Ordering::Less) => {
                    out.swap(j - 1, j);
                    j -= 1;
                }
                Some(_) => break,
                None => return Ok(None),
            }
        }
    }
    Ok(Some(out))
}

fn inversions(rank_order: &[usize], cip: &[usize]) -> usize {
    let pos = |a: usize| cip.iter().position(|&x| x == a).unwrap_or(0);
    let mut count = 0;
    for i in 0..rank_order.len() {
        for j in i + 1..rank_order.len() {
            if pos(rank_order[i]) > pos(rank_order[j]) {
                count += 1;
            }
        }
    }
    count
}

/// Translate canonical parities into CIP descriptors. Failures are
/// recorded in the context and flagged as `Problem`; canonicalization
/// itself never depends on this step.
#[instrument(level = "debug", skip_all)]
pub(crate) fn assign_descriptors<M: StereoView>(mol: &M, ctx: &mut Ctx) {
    for atom in 0..mol.atom_count() {
        let info = ctx.th[atom];
        if !info.parity.is_definite() || info.axial {
            continue;
        }
        let subs: Vec<usize> = mol.neighbors(atom).iter().map(|&(nb, _)| nb).collect();
        let mut rank_order = subs.clone();
        rank_order.sort_unstable_by_key(|&a| std::cmp::Reverse(ctx.rank[a]));
        ctx.cip_atom[atom] = match cip_order(mol, ctx, atom, &subs) {
            Ok(Some(cip)) => {
                let flips = inversions(&rank_order, &cip);
                let mut parity = info.parity;
                if flips % 2 == 1 {
                    parity = parity.flipped();
                }
                if parity == Parity::Two {
                    CipDescriptor::R
                } else {
                    CipDescriptor::S
                }
            }
            Ok(None) => {
                ctx.no_cip_distinction = true;
                CipDescriptor::Problem
            }
            Err(e) => {
                warn!(atom, error = %e, "CIP ranking failed");
                ctx.cip_error = Some(e);
                CipDescriptor::Problem
            }
        };
    }

    for bond in 0..mol.bond_count() {
        let info = ctx.ez[bond];
        if !info.parity.is_definite() || info.axial {
            continue;
        }
        let (a, b) = mol.bond_atoms(bond);
        ctx.cip_bond[bond] = match ez_descriptor(mol, ctx, bond, a, b, info.parity) {
            Ok(Some(d)) => d,
            Ok(None) => {
                ctx.no_cip_distinction = true;
                CipDescriptor::Problem
            }
            Err(e) => {
                warn!(bond, error = %e, "CIP ranking failed");
                ctx.cip_error = Some(e);
                CipDescriptor::Problem
            }
        };
    }
}

fn ez_descriptor<M: StereoView>(
    mol: &M,
    ctx: &Ctx,
    bond: usize,
    a: usize,
    b: usize,
    parity: Parity,
) -> Result<Option<CipDescriptor>, CipError> {
    // canonical parity is relative to the rank-highest substituent per
    // side; flip once for each side where CIP disagrees with rank
    let mut flips = 0;
    for (end, across) in [(a, b), (b, a)] {
        let others: Vec<usize> = mol
            .neighbors(end)
            .iter()
            .filter(|&&(nb, eb)| nb != across && eb != bond)
            .map(|&(nb, _)| nb)
            .collect();
        if others.len() == 2 {
            let rank_ref = if ctx.rank[others[0]] > ctx.rank[others[1]] {
                others[0]
            } else {
                others[1]
            };
            let cip_ref = match compare_substituents(mol, ctx, end, others[0], others[1])? {
                Some(Ordering::Greater) => others[0],
                Some(_) => others[1],
                None => return Ok(None),
            };
            if cip_ref != rank_ref {
                flips += 1;
            }
        }
    }
    let mut p = parity;
    if flips % 2 == 1 {
        p = p.flipped();
    }
    Ok(Some(if p == Parity::One {
        CipDescriptor::Z
    } else {
        CipDescriptor::E
    }))
}
