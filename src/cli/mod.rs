pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CliArgs, Commands, InspectArgs};
pub use handlers::{handle_build, handle_inspect};
pub use output::{ImageReport, OutputFormat, OutputFormatter};
