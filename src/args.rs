use clap::Parser;

/// Data-quality checks for field-survey data.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the dataset and the checks to run.
    /// The format is described in the documentation of the dq_checks::manual module.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path, optional) The dataset, as a CSV or an Excel file. Setting this option overrides
    /// the path of the dataSource section of the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (file path, optional) The table of expected submissions per unit. Setting this option overrides
    /// the path of the referenceSource section of the configuration.
    #[clap(long, value_parser)]
    pub reference_table: Option<String>,

    /// (file path, optional) The Excel workbook to write the results to.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the run will be written in JSON format
    /// to the given location.
    #[clap(long, value_parser)]
    pub summary: Option<String>,

    /// (file path) A reference file containing the summary of a run in JSON format. If provided, surveydq
    /// will check that the summary of this run matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
