mod args;
mod prio;

use clap::Parser;
use log::{debug, warn};
use snafu::ErrorCompat;

use crate::args::Args;
use crate::prio::{run_session, RunOptions};

fn main() {
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();
    debug!("args: {:?}", args);

    let opts = RunOptions {
        reference: args.reference.clone(),
        out: args.out.clone(),
        csv_out: args.csv_out.clone(),
        store: args.store.clone(),
        events: args.events,
    };

    if let Err(e) = run_session(&args.config, &opts) {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
