mod util;
use util::*;

use halo_stencil::algs::communicator::NoComm;
use halo_stencil::algs::kernel::KernelConfig;
use halo_stencil::config::GlobalProblem;
use halo_stencil::driver::{Solver, run_threaded};
use halo_stencil::report::{ResultLine, compare_results};
use serial_test::serial;

fn values(lines: &[ResultLine]) -> Vec<u64> {
    bits(lines.iter().map(|l| l.value))
}

#[test]
#[serial]
fn multi_rank_runs_reproduce_single_rank_values() {
    for (p, dims) in GROUPS {
        let problem = GlobalProblem::new(dims, 3);
        let single = run_threaded(problem, 1, KernelConfig::serial()).unwrap();
        let split = run_threaded(problem, p, KernelConfig::default()).unwrap();
        assert_eq!(split.len(), 3, "P={p}: exactly one rank reports");
        assert_eq!(values(&split), values(&single), "P={p}");
        assert!(split.iter().all(|l| l.dims == dims));
    }
}

#[test]
#[serial]
fn identical_runs_emit_identical_values() {
    let problem = GlobalProblem::new([17, 18, 18], 4);
    let first = run_threaded(problem, 4, KernelConfig::default()).unwrap();
    let second = run_threaded(problem, 4, KernelConfig::default()).unwrap();
    assert_eq!(values(&first), values(&second));
    let cmp = compare_results(&first, &second).unwrap();
    assert!(cmp.is_match());
}

#[test]
fn written_lines_parse_back() {
    let problem = GlobalProblem::new([10, 12, 14], 2);
    let mut solver = Solver::new(problem, &NoComm, KernelConfig::default()).unwrap();
    let mut out = Vec::new();
    let lines = solver.run(&mut out).unwrap();
    let parsed = halo_stencil::report::read_results(out.as_slice()).unwrap();
    assert_eq!(parsed.len(), lines.len());
    for (p, l) in parsed.iter().zip(&lines) {
        assert!((p.value - l.value).abs() < 1e-14);
        assert_eq!(p.dims, [10, 12, 14]);
    }
}

#[test]
#[serial]
fn thin_subdomains_still_complete() {
    let _ = env_logger::builder().is_test(true).try_init();
    // 32 cells over 8 ranks on z leaves 4 cells per rank, below the halo.
    let problem = GlobalProblem::new([32, 32, 32], 2);
    let lines = run_threaded(problem, 8, KernelConfig::default()).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.value.is_finite()));
}
