// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the extract and inspect entry points

pub mod extract;
pub mod inspect;

pub use extract::{extract, ExtractArgs};
pub use inspect::{inspect, InspectArgs};
