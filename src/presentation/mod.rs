//! Presentation layer: the terminal front end.

pub mod cli;
