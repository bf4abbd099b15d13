//! Per-rank solver state and the iteration loop.
//!
//! A [`Solver`] owns the three meshes of one rank (`A` evolving, `B`
//! coefficients, `C` scratch) and borrows the communicator of its group. Every
//! rank of the group must drive its solver through the same sequence of calls:
//! construction, exchanges and reductions are collective.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crate::algs::communicator::{Communicator, ThreadComm};
use crate::algs::halo::GhostExchanger;
use crate::algs::kernel::{self, KernelConfig};
use crate::chrono::{self, Chrono};
use crate::config::GlobalProblem;
use crate::data::init::init_meshes;
use crate::data::mesh::{Mesh, MeshKind};
use crate::debug_invariants::DebugInvariants;
use crate::report::ResultLine;
use crate::stencil_error::StencilError;
use crate::topology::decomposition::Decomposition;

pub struct Solver<'c, C: Communicator> {
    problem: GlobalProblem,
    decomposition: Decomposition,
    comm: &'c C,
    kernel: KernelConfig,
    a: Mesh,
    b: Mesh,
    c: Mesh,
    chrono: Chrono,
}

impl<'c, C: Communicator> Solver<'c, C> {
    /// Decompose `problem` over the group of `comm`, allocate and initialize
    /// the meshes of this rank, and exchange all three halos once.
    ///
    /// Collective: every rank of the group must call it.
    pub fn new(
        problem: GlobalProblem,
        comm: &'c C,
        kernel: KernelConfig,
    ) -> Result<Self, StencilError> {
        let decomposition = Decomposition::new(comm.rank(), comm.size(), problem.dims())?;
        if comm.rank() == 0 {
            log::debug!("\n{problem}");
            log::info!(
                "{} ranks as {:?} process grid over {:?} cells, {} iterations",
                comm.size(),
                decomposition.factors(),
                problem.dims(),
                problem.niter
            );
        }
        log::debug!("\n{decomposition}");

        let local = decomposition.local_dims();
        let mut a = Mesh::new(local, MeshKind::Input)?;
        let mut b = Mesh::new(local, MeshKind::Constant)?;
        let mut c = Mesh::new(local, MeshKind::Output)?;
        init_meshes(&mut a, &mut b, &mut c, &decomposition)?;
        for mesh in [&a, &b, &c] {
            mesh.debug_assert_invariants();
        }

        let mut halo = GhostExchanger::new(&decomposition, comm);
        halo.exchange(&mut a)?;
        halo.exchange(&mut b)?;
        halo.exchange(&mut c)?;

        Ok(Self {
            problem,
            decomposition,
            comm,
            kernel,
            a,
            b,
            c,
            chrono: Chrono::new(),
        })
    }

    pub fn problem(&self) -> &GlobalProblem {
        &self.problem
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    /// Evolving field `A`.
    pub fn a(&self) -> &Mesh {
        &self.a
    }

    /// Coefficient field `B`.
    pub fn b(&self) -> &Mesh {
        &self.b
    }

    /// Scratch field `C`.
    pub fn c(&self) -> &Mesh {
        &self.c
    }

    /// Whether this rank owns the global midpoint and therefore reports.
    pub fn owns_midpoint(&self) -> bool {
        self.decomposition.owns_global(self.problem.midpoint())
    }

    /// Current value of `A` at the global midpoint, on its owner only.
    pub fn midpoint_value(&self) -> Option<f64> {
        self.decomposition
            .to_local(self.problem.midpoint())
            .map(|[i, j, k]| self.a.get(i, j, k))
    }

    /// One timed iteration: kernel, then halo exchange of `A` and `C`.
    pub fn step(&mut self) -> Result<Duration, StencilError> {
        self.chrono.start();
        kernel::apply(&mut self.a, &self.b, &mut self.c, &self.kernel)?;
        let mut halo = GhostExchanger::new(&self.decomposition, self.comm);
        halo.exchange(&mut self.a)?;
        halo.exchange(&mut self.c)?;
        self.chrono.stop();
        Ok(self.chrono.elapsed())
    }

    /// Average `elapsed` over the group and build the result line on the
    /// midpoint owner. Collective.
    pub fn report(&self, elapsed: Duration) -> Result<Option<ResultLine>, StencilError> {
        let [dx, dy, dz] = self.problem.dims();
        let ns_per_element = chrono::as_ns_f64(elapsed) / dx as f64 / dy as f64 / dz as f64;
        let mut timings = [chrono::as_s_f64(elapsed), ns_per_element];
        self.comm.allreduce_sum(&mut timings)?;
        let size = self.comm.size() as f64;
        Ok(self.midpoint_value().map(|value| ResultLine {
            value,
            elapsed_s: timings[0] / size,
            ns_per_element: timings[1] / size,
            dims: self.problem.dims(),
        }))
    }

    /// Run every iteration, writing one line per iteration to `out` on the
    /// midpoint owner. Returns the lines this rank wrote.
    pub fn run(&mut self, out: &mut dyn Write) -> Result<Vec<ResultLine>, StencilError> {
        let niter = self.problem.niter;
        let mut lines = Vec::new();
        for it in 0..niter {
            if self.comm.rank() == 0 {
                log::debug!("iteration #{:2}/{:2}", it + 1, niter);
            }
            let elapsed = self.step()?;
            if let Some(line) = self.report(elapsed)? {
                writeln!(out, "{line}")?;
                lines.push(line);
            }
        }
        out.flush()?;
        Ok(lines)
    }
}

/// Run `problem` on `nranks` in-process ranks, one thread each, and return the
/// midpoint owner's result lines.
///
/// A rank that fails while its peers wait on it stalls the group, as with any
/// other backend. That includes a halo exchange rejecting a wrongly sized mesh,
/// which returns before reaching any barrier.
pub fn run_threaded(
    problem: GlobalProblem,
    nranks: usize,
    kernel: KernelConfig,
) -> Result<Vec<ResultLine>, StencilError> {
    if nranks == 0 {
        return Err(StencilError::InvalidRank {
            rank: 0,
            process_count: 0,
        });
    }
    let comms = ThreadComm::group(nranks);
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    Solver::new(problem, comm, kernel)?.run(&mut io::sink())
                })
            })
            .collect();
        let mut lines = Vec::new();
        let mut first_err = None;
        for (rank, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(mut rank_lines)) => lines.append(&mut rank_lines),
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    first_err.get_or_insert(StencilError::RankPanicked(rank));
                }
            }
        }
        first_err.map_or(Ok(lines), Err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn single_rank_reports_every_iteration() {
        let problem = GlobalProblem::new([6, 7, 8], 3);
        let mut solver = Solver::new(problem, &NoComm, KernelConfig::serial()).unwrap();
        assert!(solver.owns_midpoint());
        let mut out = Vec::new();
        let lines = solver.run(&mut out).unwrap();
        assert_eq!(lines.len(), 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().all(|l| l.ends_with(" 6 7 8")));
        assert_eq!(lines[2].value, solver.midpoint_value().unwrap());
    }

    #[test]
    fn zero_iterations_write_nothing() {
        let problem = GlobalProblem::new([4, 4, 4], 0);
        let mut solver = Solver::new(problem, &NoComm, KernelConfig::default()).unwrap();
        let mut out = Vec::new();
        assert!(solver.run(&mut out).unwrap().is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn oversplit_group_fails_on_every_rank() {
        let err = run_threaded(GlobalProblem::new([2, 2, 2], 1), 3, KernelConfig::serial());
        assert!(matches!(err, Err(StencilError::AxisOverflow { .. })));
    }

    #[test]
    fn threaded_two_ranks_match_single_rank() {
        let problem = GlobalProblem::new([17, 17, 17], 2);
        let single = run_threaded(problem, 1, KernelConfig::serial()).unwrap();
        let split = run_threaded(problem, 2, KernelConfig::serial()).unwrap();
        let values = |l: &[ResultLine]| l.iter().map(|r| r.value.to_bits()).collect::<Vec<_>>();
        assert_eq!(values(&single), values(&split));
    }
}
