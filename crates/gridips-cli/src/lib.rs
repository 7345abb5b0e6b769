pub mod cli;
pub mod common;

pub use cli::{Cli, Commands, OpfArgs};
