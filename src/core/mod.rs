#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Core protocol: types, curve/VOPRF cryptography, token lifecycle,
//! transfer validation.

pub mod crypto;
pub mod token;
pub mod types;
pub mod validate;
