//! SYSPACE - schema migrations for the ShareYourSpace platform.
//!
//! The binary drives [`syspace_runtime::migrations::MigrationEngine`] from the
//! command line; the platform's own revision scripts are embedded so a bare
//! `syspace migrate upgrade` works without a script directory.

pub mod cli;
pub mod scripts;

pub use scripts::{builtin_scripts, ScriptSource};
