//! Per-iteration result lines and the comparison of two result files.
//!
//! A result line is
//! `value elapsed_s ns_per_element dim_x dim_y dim_z`, formatted as
//! `{:+18.15} {:12.9} {:12.3} {} {} {}`. One line is written per iteration by
//! the rank owning the global midpoint.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stencil_error::StencilError;

/// Absolute difference above which two midpoint values are said to diverge.
pub const VALUE_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultLine {
    /// Midpoint value of `A` after the iteration.
    pub value: f64,
    /// Iteration wall time in seconds, averaged over the group.
    pub elapsed_s: f64,
    /// Iteration wall time per global cell in nanoseconds, averaged over the
    /// group.
    pub ns_per_element: f64,
    pub dims: [usize; 3],
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.dims;
        write!(
            f,
            "{:+18.15} {:12.9} {:12.3} {} {} {}",
            self.value, self.elapsed_s, self.ns_per_element, x, y, z
        )
    }
}

impl FromStr for ResultLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [value, elapsed, ns, x, y, z] = fields[..] else {
            return Err(format!("expected 6 fields, got {}", fields.len()));
        };
        let float = |f: &str| f.parse::<f64>().map_err(|e| format!("`{f}`: {e}"));
        let int = |f: &str| f.parse::<usize>().map_err(|e| format!("`{f}`: {e}"));
        Ok(Self {
            value: float(value)?,
            elapsed_s: float(elapsed)?,
            ns_per_element: float(ns)?,
            dims: [int(x)?, int(y)?, int(z)?],
        })
    }
}

/// Parse every non-blank line of `reader`.
pub fn read_results<R: BufRead>(reader: R) -> Result<Vec<ResultLine>, StencilError> {
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .parse()
            .map_err(|reason| StencilError::ResultFormat { line: n + 1, reason })?;
        out.push(parsed);
    }
    Ok(out)
}

/// Outcome of [`compare_results`].
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    /// `(iteration, |reference - result|)` for every diverging iteration,
    /// iterations counted from 1.
    pub diverging: Vec<(usize, f64)>,
    /// Iterations present in only one of the two files.
    pub unmatched: usize,
    pub reference_mean_s: f64,
    pub results_mean_s: f64,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.diverging.is_empty() && self.unmatched == 0
    }

    /// How much faster the results ran than the reference, in percent of the
    /// results' mean runtime. Negative when the reference is faster.
    pub fn speedup_percent(&self) -> f64 {
        (self.reference_mean_s / self.results_mean_s - 1.0) * 100.0
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (it, diff) in &self.diverging {
            writeln!(f, "warning: difference found at iteration {it}: {diff:e}")?;
        }
        if self.unmatched > 0 {
            writeln!(f, "warning: {} iterations have no counterpart", self.unmatched)?;
        }
        if !self.is_match() {
            let its: Vec<String> = self.diverging.iter().map(|(it, _)| it.to_string()).collect();
            return write!(
                f,
                "Results diverge too much from reference. Incorrect iterations: {}",
                its.join(", ")
            );
        }
        let acc = self.speedup_percent();
        if self.reference_mean_s < self.results_mean_s {
            write!(f, "Reference is {:.2}% faster than result", -acc)
        } else if self.reference_mean_s > self.results_mean_s {
            write!(f, "Result is {acc:.2}% faster than reference")
        } else {
            write!(f, "Reference and result have the same average runtime")
        }
    }
}

fn mean_elapsed(lines: &[ResultLine]) -> f64 {
    if lines.is_empty() {
        return 0.0;
    }
    lines.iter().map(|l| l.elapsed_s).sum::<f64>() / lines.len() as f64
}

/// Compare a run against a reference run of the same problem.
///
/// # Errors
/// - [`StencilError::ResultFormat`] if either side is empty.
/// - [`StencilError::ResultDims`] if the first lines name different global
///   dimensions.
pub fn compare_results(
    reference: &[ResultLine],
    results: &[ResultLine],
) -> Result<Comparison, StencilError> {
    let (Some(r0), Some(c0)) = (reference.first(), results.first()) else {
        return Err(StencilError::ResultFormat {
            line: 0,
            reason: "no result lines".into(),
        });
    };
    if r0.dims != c0.dims {
        return Err(StencilError::ResultDims {
            reference: r0.dims,
            results: c0.dims,
        });
    }
    let diverging = reference
        .iter()
        .zip(results)
        .enumerate()
        .filter_map(|(n, (r, c))| {
            let diff = (r.value - c.value).abs();
            (diff > VALUE_TOLERANCE || diff.is_nan()).then_some((n + 1, diff))
        })
        .collect();
    Ok(Comparison {
        diverging,
        unmatched: reference.len().abs_diff(results.len()),
        reference_mean_s: mean_elapsed(reference),
        results_mean_s: mean_elapsed(results),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(value: f64, elapsed_s: f64) -> ResultLine {
        ResultLine {
            value,
            elapsed_s,
            ns_per_element: 1.0,
            dims: [4, 4, 4],
        }
    }

    #[test]
    fn display_uses_fixed_columns() {
        let l = ResultLine {
            value: 0.5,
            elapsed_s: 0.25,
            ns_per_element: 12.5,
            dims: [100, 100, 100],
        };
        assert_eq!(
            l.to_string(),
            "+0.500000000000000  0.250000000       12.500 100 100 100"
        );
    }

    #[test]
    fn parse_rejects_short_lines() {
        assert!("1.0 2.0 3.0".parse::<ResultLine>().is_err());
        assert!("x 2.0 3.0 1 1 1".parse::<ResultLine>().is_err());
    }

    #[test]
    fn read_skips_blank_lines_and_reports_bad_ones() {
        let text = "+1.0 0.1 1.0 4 4 4\n\n+2.0 0.1 1.0 4 4 4\n";
        assert_eq!(read_results(text.as_bytes()).unwrap().len(), 2);
        let err = read_results("+1.0 0.1 1.0 4 4 4\nbad\n".as_bytes()).unwrap_err();
        assert!(matches!(err, StencilError::ResultFormat { line: 2, .. }));
    }

    #[test]
    fn divergence_is_reported_per_iteration() {
        let reference = [line(1.0, 2.0), line(2.0, 2.0), line(3.0, 2.0)];
        let results = [line(1.0, 1.0), line(2.0 + 1e-9, 1.0), line(3.0 + 1e-13, 1.0)];
        let cmp = compare_results(&reference, &results).unwrap();
        assert_eq!(cmp.diverging.len(), 1);
        assert_eq!(cmp.diverging[0].0, 2);
        assert!(!cmp.is_match());
        assert!(cmp.to_string().ends_with("Incorrect iterations: 2"));
    }

    #[test]
    fn runtime_ratio() {
        let cmp = compare_results(&[line(1.0, 2.0)], &[line(1.0, 1.0)]).unwrap();
        assert!(cmp.is_match());
        assert_eq!(cmp.speedup_percent(), 100.0);
        assert_eq!(cmp.to_string(), "Result is 100.00% faster than reference");
    }

    #[test]
    fn dims_must_agree() {
        let mut other = line(1.0, 1.0);
        other.dims = [5, 4, 4];
        assert!(matches!(
            compare_results(&[line(1.0, 1.0)], &[other]),
            Err(StencilError::ResultDims { .. })
        ));
    }
}
