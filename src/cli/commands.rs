use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deterministic pod image provisioning from a declarative spec
#[derive(Parser, Debug)]
#[command(
    name = "podkiln",
    about = "Deterministic pod image provisioning from a declarative spec",
    version,
    author,
    long_about = "podkiln assembles task pod images through a fixed seven-stage pipeline: \
                  base runtime, cloud client, isolated environment, pinned requirements, \
                  build-control file, payload and version stamp. Identical inputs always \
                  produce byte-identical layers and image IDs."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build a pod image from a spec",
        long_about = "Runs the seven-stage provisioning pipeline against a build context \
                      and publishes the image into an OCI layout directory.\n\n\
                      Examples:\n  \
                      podkiln build --tag v123\n  \
                      podkiln build pod.yaml --tag v123 --context ./core\n  \
                      podkiln build --tag v123 --offline --format json"
    )]
    Build(BuildArgs),

    #[command(
        about = "Inspect a published pod image",
        long_about = "Loads a published image back out of an OCI layout directory and \
                      prints its identity, env contract and layer table.\n\n\
                      Examples:\n  \
                      podkiln inspect\n  \
                      podkiln inspect /var/lib/podkiln --tag v123\n  \
                      podkiln inspect --format yaml"
    )]
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(
        value_name = "SPEC",
        help = "Path to the pod spec (defaults to pod.yaml in the context)"
    )]
    pub spec: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        help = "Build tag stamped into the image as FLYTE_INTERNAL_IMAGE"
    )]
    pub tag: Option<String>,

    #[arg(
        short = 'c',
        long,
        value_name = "DIR",
        help = "Build context directory (defaults to current directory)"
    )]
    pub context: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        value_name = "DIR",
        help = "Layout directory to publish into (overrides PODKILN_STORE_DIR)"
    )]
    pub store: Option<PathBuf>,

    #[arg(long, help = "Materialize pinned requirements without a network")]
    pub offline: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the build report to a file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[arg(
        value_name = "LAYOUT",
        help = "Layout directory (defaults to the configured store)"
    )]
    pub layout: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        help = "Tag to look up (omit for the most recently published image)"
    )]
    pub tag: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
