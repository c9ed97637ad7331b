#[rustfmt::skip]
pub mod atom_info;
pub mod canon;
pub mod molecule;
pub mod rings;

pub mod prelude {
    pub use crate::canon::{Canonizer, ChiralityClass, CipDescriptor, Mode};
    pub use crate::molecule::{
        Atom, Bond, BondKind, BondStereo, Esr, EsrType, GraphView, Molecule, Parity, Radical,
        RingView, StereoView, StereoWrite,
    };
}

#[cfg(test)]
mod tests;
