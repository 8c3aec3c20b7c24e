//! Command modules - one file per CLI command

pub mod hash;
pub mod inspect;
pub mod pack;
pub mod runtime;
pub mod unpack;
pub mod verify;
