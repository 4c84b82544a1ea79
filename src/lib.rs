//! Reading, editing and writing of Gaussian quantum chemistry files.
//!
//! - [`GaussianOut`] extracts geometries, SCF energies and the termination
//!   status from a calculation log.
//! - [`GaussianIn`] is an editable input job which writes back unchanged
//!   sections exactly as they were read.
//! - [`write_deck`] chains several jobs with `--Link1--` separators.
//! - [`write_xyz`] exports a geometry for visualization tools.

pub mod atom;
pub mod error;
pub mod format;
pub mod formats;
pub mod geometry;
pub mod periodic;

pub use atom::Atom;
pub use error::CError;
pub use format::{Document, FileFormat, TextFormat, WriteFormat};
pub use formats::deck::{read_deck, write_deck, write_deck_file, write_deck_to, LINK1_SEPARATOR};
pub use formats::gaussian_in::{FreezeFlag, GaussianIn, GeometrySource, Link0, Route};
pub use formats::gaussian_out::{
    ConvergenceCriterion, ConvergenceStep, ErrorKind, GaussianOut, JobError, Orientation,
    ScfEnergy, TerminationStatus,
};
pub use formats::xyz::{read_xyz, write_xyz, write_xyz_file, write_xyz_to};
pub use geometry::GeometrySnapshot;
