use clap::Parser;
use log::{debug, LevelFilter};
use snafu::ErrorCompat;

mod args;
mod dq;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    let settings = dq::RunSettings {
        config: args.config,
        input: args.input,
        reference_table: args.reference_table,
        out: args.out,
        summary: args.summary,
        reference: args.reference,
    };

    if let Err(e) = dq::run(&settings) {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("{}", bt);
        }
        std::process::exit(1);
    }
}
