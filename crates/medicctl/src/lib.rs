//! medicctl - CLI client for the medic diagnostic toolkit.

pub mod cli;
pub mod commands;
