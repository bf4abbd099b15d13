use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use halo_stencil::report::{self, Comparison};
use halo_stencil::stencil_error::StencilError;

/// Compare the results of a stencil run to a reference run
#[derive(Parser)]
#[command(name = "halo-compare", version)]
struct Cli {
    /// Path to the reference results
    reference: PathBuf,

    /// Path to the results under test
    results: PathBuf,
}

fn read(path: &Path) -> Result<Vec<report::ResultLine>, StencilError> {
    report::read_results(BufReader::new(File::open(path)?))
}

fn compare(cli: &Cli) -> Result<Comparison, StencilError> {
    let reference = read(&cli.reference)?;
    let results = read(&cli.results)?;
    report::compare_results(&reference, &results)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match compare(&cli) {
        Ok(cmp) => {
            println!("{cmp}");
            if !cmp.is_match() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
