//! Molecule data model and the narrow views the canonizer reads through.
//!
//! The canonizer never touches the graph storage directly; it goes through
//! [`GraphView`], [`RingView`] and [`StereoView`], and writes results back
//! through [`StereoWrite`]. [`Molecule`] is the one implementation in this
//! crate, but anything backing those traits can be canonicalized.

use crate::atom_info::ATOM_DATA;
use crate::canon::{ChiralityClass, CipDescriptor};
use crate::rings;
use c_enum::*;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::prelude::*;
use std::fmt::{self, Display, Formatter};

c_enum! {
    /// Tetrahedral, axial or double-bond parity relative to canonical ranks.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub enum Parity: u8 {
        None,
        One,
        Two,
        Unknown,
    }
}
impl Parity {
    pub fn is_definite(self) -> bool {
        self == Self::One || self == Self::Two
    }
    pub fn is_set(self) -> bool {
        self != Self::None
    }
    pub fn flipped(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
            other => other,
        }
    }
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::One => 1,
            Self::Two => 2,
            _ => 3,
        }
    }
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Unknown,
            _ => Self::None,
        }
    }
}

c_enum! {
    /// Enhanced stereo representation kinds (MDL ABS/AND/OR).
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub enum EsrType: u8 {
        Abs,
        And,
        Or,
    }
}
impl EsrType {
    pub fn code(self) -> u8 {
        match self {
            Self::And => 1,
            Self::Or => 2,
            _ => 0,
        }
    }
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::And,
            2 => Self::Or,
            _ => Self::Abs,
        }
    }
}

/// An ESR label: kind plus group number. Group numbers are renumbered
/// canonically during canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Esr {
    pub kind: EsrType,
    pub group: u8,
}
impl Esr {
    pub const ABS: Self = Self {
        kind: EsrType::Abs,
        group: 0,
    };
    pub fn and(group: u8) -> Self {
        Self {
            kind: EsrType::And,
            group,
        }
    }
    pub fn or(group: u8) -> Self {
        Self {
            kind: EsrType::Or,
            group,
        }
    }
    pub fn is_grouped(self) -> bool {
        self.kind != EsrType::Abs
    }
}
impl Default for Esr {
    fn default() -> Self {
        Self::ABS
    }
}

c_enum! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub enum Radical: u8 {
        None,
        Singlet,
        Doublet,
        Triplet,
    }
}
impl Radical {
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Singlet => 1,
            Self::Doublet => 2,
            _ => 3,
        }
    }
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Singlet,
            2 => Self::Doublet,
            3 => Self::Triplet,
            _ => Self::None,
        }
    }
}

c_enum! {
    /// Bond kind; the numeric value of the plain kinds is the bond order.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub enum BondKind: u8 {
        Dative,
        Single,
        Double,
        Triple,
        Quadruple,
        Quintuple,
        Delocalized,
    }
}
impl BondKind {
    pub fn order(self) -> u8 {
        match self {
            Self::Dative => 0,
            Self::Single | Self::Delocalized => 1,
            Self::Double => 2,
            Self::Triple => 3,
            Self::Quadruple => 4,
            Self::Quintuple => 5,
            _ => 1,
        }
    }
    /// Extra (pi) bond order beyond a sigma bond, delocalized counting as one.
    pub fn pi_count(self) -> u8 {
        match self {
            Self::Double | Self::Delocalized => 1,
            Self::Triple => 2,
            Self::Quadruple => 3,
            Self::Quintuple => 4,
            _ => 0,
        }
    }
}

c_enum! {
    /// Drawn stereo marking on a bond, from the narrow end.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub enum BondStereo: u8 {
        None,
        Up,
        Down,
        Cross,
    }
}

/// An atom in the molecule graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Atomic number; 0 is the "any atom" wildcard.
    pub atomic_num: u8,
    /// Isotope mass, 0 for natural abundance.
    pub mass: u16,
    pub charge: i8,
    pub radical: Radical,
    pub abnormal_valence: Option<u8>,
    pub implicit_h: u8,
    /// Reaction atom-mapping number, 0 for unmapped.
    pub map_no: u16,
    pub map_auto: bool,
    pub custom_label: Option<String>,
    /// Allowed-element wildcard list; fragments only.
    pub atom_list: Option<Vec<u8>>,
    /// Query feature bitset; fragments only.
    pub query_features: u32,
    pub esr: Esr,
    pub coords: [f64; 3],
    pub selected: bool,
    pub th_parity: Parity,
    pub th_pseudo: bool,
    pub is_stereo_center: bool,
    pub cip: CipDescriptor,
}
impl Atom {
    pub fn new(atomic_num: u8) -> Self {
        Self {
            atomic_num,
            mass: 0,
            charge: 0,
            radical: Radical::None,
            abnormal_valence: None,
            implicit_h: 0,
            map_no: 0,
            map_auto: false,
            custom_label: None,
            atom_list: None,
            query_features: 0,
            esr: Esr::ABS,
            coords: [0.0; 3],
            selected: false,
            th_parity: Parity::None,
            th_pseudo: false,
            is_stereo_center: false,
            cip: CipDescriptor::None,
        }
    }
    pub fn at(atomic_num: u8, x: f64, y: f64) -> Self {
        let mut a = Self::new(atomic_num);
        a.coords = [x, y, 0.0];
        a
    }
    pub fn mass_or_natural(&self) -> f32 {
        if self.mass != 0 {
            self.mass as f32
        } else {
            ATOM_DATA[self.atomic_num as usize].mass
        }
    }
}
impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use fmtastic::Superscript;
        if self.mass != 0 {
            write!(f, "{}", Superscript(self.mass))?;
        }
        write!(f, "{}", ATOM_DATA[self.atomic_num as usize].sym)?;
        match self.charge {
            0 => {}
            1 => f.write_str("⁺")?,
            -1 => f.write_str("⁻")?,
            _ => write!(f, "{:+}", Superscript(self.charge))?,
        }
        Ok(())
    }
}

/// A bond in the molecule graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub kind: BondKind,
    pub stereo: BondStereo,
    pub query_features: u32,
    pub esr: Esr,
    pub ez_parity: Parity,
    pub ez_pseudo: bool,
    pub cip: CipDescriptor,
}
impl Bond {
    pub fn new(kind: BondKind) -> Self {
        Self {
            kind,
            stereo: BondStereo::None,
            query_features: 0,
            esr: Esr::ABS,
            ez_parity: Parity::None,
            ez_pseudo: false,
            cip: CipDescriptor::None,
        }
    }
    pub fn single() -> Self {
        Self::new(BondKind::Single)
    }
    pub fn double() -> Self {
        Self::new(BondKind::Double)
    }
    pub fn up() -> Self {
        let mut b = Self::single();
        b.stereo = BondStereo::Up;
        b
    }
    pub fn down() -> Self {
        let mut b = Self::single();
        b.stereo = BondStereo::Down;
        b
    }
}

/// The molecule graph is an undirected `petgraph` graph between atoms.
pub type MolGraph = UnGraph<Atom, Bond>;

/// Graph plus the helper arrays the canonizer assumes are in place.
///
/// `finalize` must run after construction and before canonicalization; it
/// builds neighbor lists and ring-size arrays. The canonizer treats all of
/// this as read-only.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    graph: MolGraph,
    pub is_fragment: bool,
    dims: u8,
    parities_valid: bool,
    chirality_class: ChiralityClass,
    adj: Vec<Vec<(usize, usize)>>,
    ring_size_atom: Vec<u8>,
    ring_size_bond: Vec<u8>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.graph.add_node(atom).index()
    }
    pub fn add_bond(&mut self, a: usize, b: usize, bond: Bond) -> usize {
        self.graph
            .add_edge(NodeIndex::new(a), NodeIndex::new(b), bond)
            .index()
    }

    pub fn atom(&self, a: usize) -> &Atom {
        &self.graph[NodeIndex::new(a)]
    }
    pub fn atom_mut(&mut self, a: usize) -> &mut Atom {
        &mut self.graph[NodeIndex::new(a)]
    }
    pub fn bond(&self, b: usize) -> &Bond {
        &self.graph[EdgeIndex::new(b)]
    }
    pub fn bond_mut(&mut self, b: usize) -> &mut Bond {
        &mut self.graph[EdgeIndex::new(b)]
    }

    pub fn set_dims(&mut self, dims: u8) {
        debug_assert!(dims == 0 || dims == 2 || dims == 3);
        self.dims = dims;
    }
    pub fn chirality_class(&self) -> ChiralityClass {
        self.chirality_class
    }

    /// Build the helper arrays (neighbor lists, smallest ring sizes).
    /// Must be called again after any structural edit.
    pub fn finalize(&mut self) {
        let n = self.graph.node_count();
        let mut adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        let mut ends = Vec::with_capacity(self.graph.edge_count());
        for e in self.graph.edge_indices() {
            // edge_endpoints only fails for a stale index
            let (a, b) = match self.graph.edge_endpoints(e) {
                Some(p) => p,
                None => continue,
            };
            adj[a.index()].push((b.index(), e.index()));
            adj[b.index()].push((a.index(), e.index()));
            ends.push((a.index(), b.index()));
        }
        for l in &mut adj {
            l.sort_unstable();
        }
        let (ra, rb) = rings::smallest_ring_sizes(&adj, &ends);
        self.adj = adj;
        self.ring_size_atom = ra;
        self.ring_size_bond = rb;
    }
}

/// Read-only access to the plain graph and per-atom/per-bond attributes.
pub trait GraphView {
    fn atom_count(&self) -> usize;
    fn bond_count(&self) -> usize;
    fn atomic_num(&self, a: usize) -> u8;
    fn mass(&self, a: usize) -> u16;
    fn charge(&self, a: usize) -> i8;
    fn radical(&self, a: usize) -> Radical;
    fn abnormal_valence(&self, a: usize) -> Option<u8>;
    fn implicit_h(&self, a: usize) -> u8;
    fn atom_list(&self, a: usize) -> Option<&[u8]>;
    fn custom_label(&self, a: usize) -> Option<&str>;
    fn is_selected(&self, a: usize) -> bool;
    fn map_no(&self, a: usize) -> u16;
    fn map_auto(&self, a: usize) -> bool;
    fn atom_query_features(&self, a: usize) -> u32;
    /// Sorted `(neighbor, bond)` pairs.
    fn neighbors(&self, a: usize) -> &[(usize, usize)];
    fn bond_kind(&self, b: usize) -> BondKind;
    fn bond_atoms(&self, b: usize) -> (usize, usize);
    fn bond_between(&self, a: usize, b: usize) -> Option<usize>;
    fn bond_query_features(&self, b: usize) -> u32;
    fn is_fragment(&self) -> bool;

    fn degree(&self, a: usize) -> usize {
        self.neighbors(a).len()
    }
}

/// Ring helper arrays, assumed precomputed.
pub trait RingView: GraphView {
    /// Size of the smallest ring containing the atom, capped at 31; 0 if acyclic.
    fn atom_ring_size(&self, a: usize) -> u8;
    fn bond_ring_size(&self, b: usize) -> u8;

    fn is_ring_atom(&self, a: usize) -> bool {
        self.atom_ring_size(a) != 0
    }
    fn is_ring_bond(&self, b: usize) -> bool {
        self.bond_ring_size(b) != 0
    }
    fn ring_bond_count(&self, a: usize) -> usize {
        self.neighbors(a)
            .iter()
            .filter(|&&(_, b)| self.is_ring_bond(b))
            .count()
    }
}

/// Coordinates, drawn stereo markings and stored parities.
pub trait StereoView: RingView {
    /// 0 when the molecule carries no coordinates, else 2 or 3.
    fn dims(&self) -> u8;
    fn coords(&self, a: usize) -> [f64; 3];
    fn bond_stereo(&self, b: usize) -> BondStereo;
    fn th_parity(&self, a: usize) -> Parity;
    fn ez_parity(&self, b: usize) -> Parity;
    fn atom_esr(&self, a: usize) -> Esr;
    fn bond_esr(&self, b: usize) -> Esr;
    /// True when stored parities (not coordinates) are the source of truth,
    /// as for a molecule decoded from an idcode.
    fn parities_valid(&self) -> bool;
}

/// Result writeback, called at most once per canonicalization.
pub trait StereoWrite: StereoView {
    fn set_th_parity(&mut self, a: usize, parity: Parity, pseudo: bool);
    fn set_ez_parity(&mut self, b: usize, parity: Parity, pseudo: bool);
    fn set_stereo_center(&mut self, a: usize, is_center: bool);
    fn set_cip_atom(&mut self, a: usize, d: CipDescriptor);
    fn set_cip_bond(&mut self, b: usize, d: CipDescriptor);
    fn set_chirality(&mut self, c: ChiralityClass);
    fn set_parities_valid(&mut self, valid: bool);
}

impl GraphView for Molecule {
    fn atom_count(&self) -> usize {
        self.graph.node_count()
    }
    fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }
    fn atomic_num(&self, a: usize) -> u8 {
        self.atom(a).atomic_num
    }
    fn mass(&self, a: usize) -> u16 {
        self.atom(a).mass
    }
    fn charge(&self, a: usize) -> i8 {
        self.atom(a).charge
    }
    fn radical(&self, a: usize) -> Radical {
        self.atom(a).radical
    }
    fn abnormal_valence(&self, a: usize) -> Option<u8> {
        self.atom(a).abnormal_valence
    }
    fn implicit_h(&self, a: usize) -> u8 {
        self.atom(a).implicit_h
    }
    fn atom_list(&self, a: usize) -> Option<&[u8]> {
        self.atom(a).atom_list.as_deref()
    }
    fn custom_label(&self, a: usize) -> Option<&str> {
        self.atom(a).custom_label.as_deref()
    }
    fn is_selected(&self, a: usize) -> bool {
        self.atom(a).selected
    }
    fn map_no(&self, a: usize) -> u16 {
        self.atom(a).map_no
    }
    fn map_auto(&self, a: usize) -> bool {
        self.atom(a).map_auto
    }
    fn atom_query_features(&self, a: usize) -> u32 {
        self.atom(a).query_features
    }
    fn neighbors(&self, a: usize) -> &[(usize, usize)] {
        &self.adj[a]
    }
    fn bond_kind(&self, b: usize) -> BondKind {
        self.bond(b).kind
    }
    fn bond_atoms(&self, b: usize) -> (usize, usize) {
        match self.graph.edge_endpoints(EdgeIndex::new(b)) {
            Some((x, y)) => (x.index(), y.index()),
            None => (usize::MAX, usize::MAX),
        }
    }
    fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .map(|e| e.index())
    }
    fn bond_query_features(&self, b: usize) -> u32 {
        self.bond(b).query_features
    }
    fn is_fragment(&self) -> bool {
        self.is_fragment
    }
}

impl RingView for Molecule {
    fn atom_ring_size(&self, a: usize) -> u8 {
        self.ring_size_atom[a]
    }
    fn bond_ring_size(&self, b: usize) -> u8 {
        self.ring_size_bond[b]
    }
}

impl StereoView for Molecule {
    fn dims(&self) -> u8 {
        self.dims
    }
    fn coords(&self, a: usize) -> [f64; 3] {
        self.atom(a).coords
    }
    fn bond_stereo(&self, b: usize) -> BondStereo {
        self.bond(b).stereo
    }
    fn th_parity(&self, a: usize) -> Parity {
        self.atom(a).th_parity
    }
    fn ez_parity(&self, b: usize) -> Parity {
        self.bond(b).ez_parity
    }
    fn atom_esr(&self, a: usize) -> Esr {
        self.atom(a).esr
    }
    fn bond_esr(&self, b: usize) -> Esr {
        self.bond(b).esr
    }
    fn parities_valid(&self) -> bool {
        self.parities_valid
    }
}

impl StereoWrite for Molecule {
    fn set_th_parity(&mut self, a: usize, parity: Parity, pseudo: bool) {
        let atom = self.atom_mut(a);
        atom.th_parity = parity;
        atom.th_pseudo = pseudo;
    }
    fn set_ez_parity(&mut self, b: usize, parity: Parity, pseudo: bool) {
        let bond = self.bond_mut(b);
        bond.ez_parity = parity;
        bond.ez_pseudo = pseudo;
    }
    fn set_stereo_center(&mut self, a: usize, is_center: bool) {
        self.atom_mut(a).is_stereo_center = is_center;
    }
    fn set_cip_atom(&mut self, a: usize, d: CipDescriptor) {
        self.atom_mut(a).cip = d;
    }
    fn set_cip_bond(&mut self, b: usize, d: CipDescriptor) {
        self.bond_mut(b).cip = d;
    }
    fn set_chirality(&mut self, c: ChiralityClass) {
        self.chirality_class = c;
    }
    fn set_parities_valid(&mut self, valid: bool) {
        self.parities_valid = valid;
    }
}
