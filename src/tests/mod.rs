mod macros;

mod canonical;
mod codec;
mod mols;
mod stereo;
