use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use halo_stencil::prelude::*;

/// Distributed 3-D stencil solver with halo exchange
#[derive(Parser)]
#[command(name = "halo-stencil", version)]
struct Cli {
    /// Configuration file of `key=value` lines
    #[arg(default_value = "config.txt")]
    config: PathBuf,

    /// Result file; standard output when omitted
    output: Option<PathBuf>,

    /// Run N ranks as threads of this process
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Run as one rank of an MPI job (launch with mpirun)
    #[cfg(feature = "mpi-support")]
    #[arg(long)]
    mpi: bool,

    /// Cache-blocking extents of the kernel
    #[arg(long, value_name = "BI,BJ,BK", value_parser = parse_block)]
    block: Option<BlockSize>,

    /// Keep each rank's kernel on a single thread
    #[arg(long)]
    serial_kernel: bool,
}

fn parse_block(s: &str) -> Result<BlockSize, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<usize>().map_err(|e| format!("`{p}`: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts[..] {
        [bi, bj, bk] if bi > 0 && bj > 0 && bk > 0 => Ok(BlockSize::new(bi, bj, bk)),
        _ => Err("expected three positive extents BI,BJ,BK".into()),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, StencilError> {
    Ok(match path {
        Some(p) => {
            let file = File::create(p).map_err(|source| StencilError::Output {
                path: p.to_path_buf(),
                source,
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    })
}

fn run_on<C: Communicator>(
    problem: GlobalProblem,
    comm: &C,
    kernel: KernelConfig,
    output: Option<&Path>,
) -> Result<(), StencilError> {
    let mut solver = Solver::new(problem, comm, kernel)?;
    // Only the midpoint owner creates the output file, before iterating.
    let mut out: Box<dyn Write> = if solver.owns_midpoint() {
        open_output(output)?
    } else {
        Box::new(io::sink())
    };
    solver.run(&mut *out)?;
    Ok(())
}

fn run(cli: &Cli) -> Result<(), StencilError> {
    let problem = GlobalProblem::load(&cli.config);
    let kernel = KernelConfig {
        block: cli.block.unwrap_or_default(),
        parallel: !cli.serial_kernel,
    };

    #[cfg(feature = "mpi-support")]
    {
        if cli.mpi {
            if cli.threads.is_some() {
                log::warn!("--threads is ignored with --mpi");
            }
            let comm = MpiComm::new()?;
            return run_on(problem, &comm, kernel, cli.output.as_deref());
        }
    }

    match cli.threads {
        Some(n) => {
            let mut out = open_output(cli.output.as_deref())?;
            let lines = run_threaded(problem, n, kernel)?;
            for line in &lines {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
            Ok(())
        }
        None => run_on(problem, &NoComm, kernel, cli.output.as_deref()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("halo-stencil").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn config_path_defaults_to_config_txt() {
        let cli = cli(&[]);
        assert_eq!(cli.config, PathBuf::from("config.txt"));
        assert!(cli.output.is_none());
        assert!(cli.threads.is_none());
    }

    #[test]
    fn block_extents_must_be_three_positive_numbers() {
        assert_eq!(cli(&["--block", "4,2,64"]).block, Some(BlockSize::new(4, 2, 64)));
        assert!(parse_block("4,0,64").is_err());
        assert!(parse_block("4,4").is_err());
        assert!(Cli::try_parse_from(["halo-stencil", "--block", "x"]).is_err());
    }

    #[test]
    fn unopenable_output_fails_before_threads_start() {
        let cli = cli(&["/nonexistent/cfg.txt", "/nonexistent/dir/out.txt", "--threads", "2"]);
        let err = run(&cli).unwrap_err();
        assert!(matches!(err, StencilError::Output { .. }));
        assert!(err.to_string().contains("`/nonexistent/dir/out.txt`"));
    }

    #[test]
    fn run_writes_one_line_per_iteration() {
        let dir = std::env::temp_dir();
        let config = dir.join(format!("halo-stencil-{}-cli.cfg", std::process::id()));
        let output = dir.join(format!("halo-stencil-{}-cli.out", std::process::id()));
        std::fs::write(&config, "dim_x=6\ndim_y=6\ndim_z=6\nniter=2\n").unwrap();
        for threads in [None, Some("2")] {
            let mut args = vec![config.to_str().unwrap(), output.to_str().unwrap()];
            if let Some(n) = threads {
                args.extend(["--threads", n]);
            }
            run(&cli(&args)).unwrap();
            let text = std::fs::read_to_string(&output).unwrap();
            assert_eq!(text.lines().count(), 2);
            assert!(text.lines().all(|l| l.ends_with(" 6 6 6")));
        }
        std::fs::remove_file(config).ok();
        std::fs::remove_file(output).ok();
    }
}
