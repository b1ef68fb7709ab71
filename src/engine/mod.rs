//! Process execution: compiling, running and measuring programs

pub mod compiler;
pub mod executer;
pub mod memory;
pub mod timer;
