#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Curve primitives and the VOPRF client built on them.

pub mod curve;
pub mod voprf;
