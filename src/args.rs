use clap::Parser;

/// This is a pairwise prioritization program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file describing the session to replay: items, participants, votes
    /// and magnitude scores, in JSON format. See the manual of the pairwise_priority crate.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the expected summary in JSON format. If provided,
    /// prioritize will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format
    /// to the given location. Setting this option overrides the path that may be specified in
    /// the session file.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) If specified, the ranking will also be written as CSV to the given location.
    #[clap(long, value_parser)]
    pub csv_out: Option<String>,

    /// (directory) If specified, the final state of the project is saved in this directory,
    /// one JSON document per project.
    #[clap(long, value_parser)]
    pub store: Option<String>,

    /// If passed as an argument, every domain event is printed to the standard output as one
    /// line of JSON. The summary must then be written to a file.
    #[clap(long, takes_value = false)]
    pub events: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
