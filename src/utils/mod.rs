pub mod command;
pub mod fastx;
pub mod file;
pub mod mapping;
pub mod sequence;
pub mod stats;
pub mod streams;
#[doc(hidden)]
pub mod synthetic;
