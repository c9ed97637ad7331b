//! The canonicalization pipeline.
//!
//! A [`Canonizer`] runs the whole pipeline eagerly over one molecule
//! snapshot: invariant ranking, partition refinement, stereo perception,
//! tie-breaking, canonical graph construction and idcode encoding. All
//! derived state is owned by the instance; the source molecule is only read.

pub mod base_value;
pub mod cip;
pub mod decode;
pub mod encode;
pub mod graph;
mod invariants;
mod refine;
mod stereo;
mod tiebreak;

use crate::molecule::{Esr, Parity, StereoView, StereoWrite};
use graph::CanonGraph;
use modular_bitfield::prelude::*;
use tracing::{debug, instrument};

pub use cip::CipError;
pub use decode::{decode_coordinates, decode_idcode, decode_mapping, DecodeError};

/// Canonizer mode word.
///
/// The default (all zero) computes ranks, stereo parities and the idcode
/// without symmetry-rank retention or heterotopicity tie-breaking.
#[bitfield]
#[repr(u16)]
#[derive(Debug, Clone, Copy)]
pub struct Mode {
    /// Keep the pre-tiebreak ranks as a separate output.
    pub create_symmetry_rank: bool,
    /// Use stereo heterotopicity (pro-parities) to split symmetric atoms
    /// before arbitrary promotion.
    pub consider_stereoheterotopicity: bool,
    /// Fold custom label identity into the invariants and encode labels.
    pub encode_atom_custom_labels: bool,
    /// Fold atom selection into the invariants and encode the bitmap.
    pub encode_atom_selection: bool,
    /// Treat every tetrahedral nitrogen as a qualified stereo center.
    pub assume_chiral_true_nitrogen: bool,
    /// Encode coordinates at 3D resolution even for flat molecules.
    pub force_3d_coordinates: bool,
    /// Assign shared group numbers to pseudo parities within a fragment.
    pub create_pseudo_stereo_groups: bool,
    /// Keep single-group racemic OR groups distinct from AND groups.
    pub distinguish_racemic_or_groups: bool,
    /// Fold free-valence (implicit hydrogen deficit) into tie-breaking.
    pub consider_free_valence: bool,
    /// Fast path: skip all stereo perception and encoding.
    pub neglect_any_stereo: bool,
    #[skip]
    __: B6,
}

/// CIP descriptor written back onto atoms and bonds. Display only; the
/// canonical ranks and idcode never depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CipDescriptor {
    #[default]
    None,
    R,
    S,
    E,
    Z,
    /// The CIP rules could not order the substituents.
    Problem,
}

/// Aggregate chirality classification of the whole molecule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChiralityClass {
    #[default]
    NotChiral,
    Meso,
    Racemic,
    KnownEnantiomer,
    UnknownEnantiomer,
    Epimers,
    Diastereomers,
}

/// Parity plus the bookkeeping the normalization passes need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityInfo {
    pub parity: Parity,
    /// Meaningful only relative to another parity in the same fragment.
    pub pseudo: bool,
    /// True for axial (allene center / hindered biaryl) parities.
    pub axial: bool,
    pub esr: Esr,
}
impl Default for ParityInfo {
    fn default() -> Self {
        Self {
            parity: Parity::None,
            pseudo: false,
            axial: false,
            esr: Esr::ABS,
        }
    }
}

/// All mutable pipeline state, indexed by atom or bond.
#[derive(Debug, Default)]
pub(crate) struct Ctx {
    /// 1-based canonical rank per atom; equal rank = not yet distinguished.
    pub rank: Vec<u32>,
    pub rank_count: usize,
    /// Constitutional ranks, snapshotted before any parity is folded in.
    /// The meso collaborator pairs stereo centers on these.
    pub base_rank: Vec<u32>,
    /// Refinement pass counter.
    pub round: u32,
    pub max_degree: usize,
    pub th: Vec<ParityInfo>,
    pub ez: Vec<ParityInfo>,
    /// Atoms whose parity involved substituents tied under symmetry ranks.
    pub th_symmetric: Vec<bool>,
    pub ez_symmetric: Vec<bool>,
    /// Rigid fragment id per atom (ring- or pi-connected component).
    pub fragment_of: Vec<usize>,
    pub fragment_count: usize,
    /// Meso fragment ids found by the meso collaborator.
    pub meso_fragment: Vec<bool>,
    pub stereo_problem: Vec<bool>,
    pub cip_atom: Vec<CipDescriptor>,
    pub cip_bond: Vec<CipDescriptor>,
    pub no_cip_distinction: bool,
    pub cip_error: Option<CipError>,
}

impl Ctx {
    #[cfg(test)]
    pub(crate) fn new_for_tests<M: StereoView>(mol: &M) -> Self {
        Self::new(mol)
    }

    fn new<M: StereoView>(mol: &M) -> Self {
        let n = mol.atom_count();
        let b = mol.bond_count();
        Self {
            rank: vec![1; n],
            rank_count: if n == 0 { 0 } else { 1 },
            base_rank: Vec::new(),
            round: 0,
            max_degree: (0..n).map(|a| mol.degree(a)).max().unwrap_or(0),
            th: vec![ParityInfo::default(); n],
            ez: vec![ParityInfo::default(); b],
            th_symmetric: vec![false; n],
            ez_symmetric: vec![false; b],
            fragment_of: Vec::new(),
            fragment_count: 0,
            meso_fragment: Vec::new(),
            stereo_problem: vec![false; n],
            cip_atom: vec![CipDescriptor::None; n],
            cip_bond: vec![CipDescriptor::None; b],
            no_cip_distinction: false,
            cip_error: None,
        }
    }
}

/// One canonicalization run over one molecule snapshot.
pub struct Canonizer<'a, M: StereoView> {
    mol: &'a M,
    mode: Mode,
    ctx: Ctx,
    symmetry_rank: Option<Vec<u32>>,
    graph: CanonGraph,
    chirality: ChiralityClass,
    idcode: String,
}

impl<'a, M: StereoView> Canonizer<'a, M> {
    pub fn new(mol: &'a M) -> Self {
        Self::with_mode(mol, Mode::new())
    }

    #[instrument(level = "debug", skip_all)]
    pub fn with_mode(mol: &'a M, mode: Mode) -> Self {
        let mut this = Self {
            mol,
            mode,
            ctx: Ctx::new(mol),
            symmetry_rank: None,
            graph: CanonGraph::default(),
            chirality: ChiralityClass::NotChiral,
            idcode: String::new(),
        };
        this.run();
        this
    }

    fn run(&mut self) {
        let mol = self.mol;
        let mode = self.mode;
        let neglect = mode.neglect_any_stereo();

        if mol.atom_count() != 0 {
            invariants::initial_ranks(mol, mode, &mut self.ctx);
            if !neglect {
                stereo::assign_fragments(mol, &mut self.ctx);
                stereo::stereo_rounds(mol, mode, &mut self.ctx);
            }
            if mode.create_symmetry_rank() {
                self.symmetry_rank = Some(self.ctx.rank.clone());
            }
            tiebreak::break_ties(mol, mode, &mut self.ctx);
            if !neglect {
                stereo::pseudo_parity_pass(mol, mode, &mut self.ctx);
                cip::assign_descriptors(mol, &mut self.ctx);
                self.chirality = stereo::classify_chirality(&self.ctx);
            }
        }

        self.graph = graph::build(mol, &self.ctx.rank);
        self.idcode = encode::encode_idcode(mol, mode, &self.ctx, &self.graph);
        debug!(
            atoms = mol.atom_count(),
            ranks = self.ctx.rank_count,
            idcode = %self.idcode,
            "canonicalization complete"
        );
    }

    /// The canonical structure encoding; byte-exact for isomorphic inputs.
    pub fn idcode(&self) -> &str {
        &self.idcode
    }
    /// Per-atom final rank, a bijection onto `1..=atom_count`.
    pub fn final_rank(&self) -> &[u32] {
        &self.ctx.rank
    }
    /// Ranks before tie-breaking, when requested by the mode.
    pub fn symmetry_rank(&self) -> Option<&[u32]> {
        self.symmetry_rank.as_deref()
    }
    pub fn chirality(&self) -> ChiralityClass {
        self.chirality
    }
    pub fn canon_graph(&self) -> &CanonGraph {
        &self.graph
    }
    /// Non-fatal stereo diagnostic for one atom.
    pub fn stereo_problem(&self, atom: usize) -> bool {
        self.ctx.stereo_problem[atom]
    }
    /// Set when no CIP rule could distinguish some pair of substituents.
    pub fn no_cip_distinction(&self) -> bool {
        self.ctx.no_cip_distinction
    }
    /// The fatal CIP failure of this run, if any comparison hit the level cap.
    pub fn cip_error(&self) -> Option<&CipError> {
        self.ctx.cip_error.as_ref()
    }
    pub fn th_parity(&self, atom: usize) -> Parity {
        self.ctx.th[atom].parity
    }
    pub fn ez_parity(&self, bond: usize) -> Parity {
        self.ctx.ez[bond].parity
    }

    /// Coordinate side channel, keyed to the idcode's traversal order.
    /// `None` when the molecule carries no coordinates and 3D is not forced.
    pub fn encode_coordinates(&self, keep_absolute: bool) -> Option<String> {
        encode::encode_coordinates(self.mol, self.mode, &self.graph, keep_absolute)
    }
    /// Atom-mapping side channel; `None` when no atom is mapped.
    pub fn encode_mapping(&self) -> Option<String> {
        encode::encode_mapping(self.mol, &self.graph)
    }

    /// Push computed TH/EZ parities back onto the source molecule.
    pub fn set_parities<W: StereoWrite>(&self, mol: &mut W) {
        for (a, info) in self.ctx.th.iter().enumerate() {
            mol.set_th_parity(a, info.parity, info.pseudo);
        }
        for (b, info) in self.ctx.ez.iter().enumerate() {
            mol.set_ez_parity(b, info.parity, info.pseudo);
        }
    }
    /// Mark the atoms found to be stereo centers.
    pub fn set_stereo_centers<W: StereoWrite>(&self, mol: &mut W) {
        for (a, info) in self.ctx.th.iter().enumerate() {
            mol.set_stereo_center(a, info.parity.is_set());
        }
    }
    /// Push CIP descriptors back onto the source molecule.
    pub fn set_cip_parities<W: StereoWrite>(&self, mol: &mut W) {
        for (a, &d) in self.ctx.cip_atom.iter().enumerate() {
            mol.set_cip_atom(a, d);
        }
        for (b, &d) in self.ctx.cip_bond.iter().enumerate() {
            mol.set_cip_bond(b, d);
        }
    }
    /// Push the aggregate chirality classification back.
    pub fn set_chirality<W: StereoWrite>(&self, mol: &mut W) {
        mol.set_chirality(self.chirality);
    }
}
