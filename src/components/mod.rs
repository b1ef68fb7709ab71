//! Checker protocols

pub mod checker;
pub mod interactive;
