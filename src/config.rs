//! Problem configuration: global dimensions and iteration count.
//!
//! The file format is one `key=value` pair per line with keys `dim_x`,
//! `dim_y`, `dim_z` and `niter`. Blank lines and lines starting with `#` are
//! skipped, later duplicates overwrite earlier ones. Anything else makes the
//! whole file invalid and [`GlobalProblem::load`] falls back to the default
//! problem, discarding keys it had already read.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stencil_error::StencilError;

/// Global problem size and iteration count. Immutable once loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalProblem {
    pub dim_x: usize,
    pub dim_y: usize,
    pub dim_z: usize,
    pub niter: usize,
}

impl Default for GlobalProblem {
    fn default() -> Self {
        Self {
            dim_x: 100,
            dim_y: 100,
            dim_z: 100,
            niter: 5,
        }
    }
}

impl GlobalProblem {
    pub const fn new(dims: [usize; 3], niter: usize) -> Self {
        Self {
            dim_x: dims[0],
            dim_y: dims[1],
            dim_z: dims[2],
            niter,
        }
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        [self.dim_x, self.dim_y, self.dim_z]
    }

    /// Global cell updated and reported by the midpoint owner.
    #[inline]
    pub fn midpoint(&self) -> [usize; 3] {
        self.dims().map(|d| d / 2)
    }

    /// Number of global cells.
    pub fn cells(&self) -> usize {
        self.dims().iter().product()
    }

    /// Parse configuration text. Starts from [`GlobalProblem::default`].
    ///
    /// # Errors
    /// [`StencilError::Config`] on the first line that is not a comment, blank,
    /// or a `key=value` pair with a known key and an unsigned integer value.
    pub fn parse(text: &str) -> Result<Self, StencilError> {
        let mut problem = Self::default();
        for (n, raw) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |reason: String| StencilError::Config {
                line: line_no,
                reason,
            };
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| err(format!("expected `key=value`, got `{line}`")))?;
            let key = key.trim();
            let value: usize = value
                .trim()
                .parse()
                .map_err(|e| err(format!("value of `{key}`: {e}")))?;
            match key {
                "dim_x" => problem.dim_x = value,
                "dim_y" => problem.dim_y = value,
                "dim_z" => problem.dim_z = value,
                "niter" => problem.niter = value,
                other => return Err(err(format!("unknown key `{other}`"))),
            }
        }
        Ok(problem)
    }

    /// Read and parse the file at `path`.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, StencilError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Like [`GlobalProblem::try_load`], but any failure is logged as a
    /// warning and yields the default problem.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::try_load(path).unwrap_or_else(|e| {
            log::warn!(
                "configuration `{}` rejected ({e}), using default",
                path.display()
            );
            Self::default()
        })
    }
}

impl FromStr for GlobalProblem {
    type Err = StencilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GlobalProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "****************************************")?;
        writeln!(f, "         STENCIL CONFIGURATION")?;
        writeln!(f, "X-axis dimension ................... {}", self.dim_x)?;
        writeln!(f, "Y-axis dimension ................... {}", self.dim_y)?;
        writeln!(f, "Z-axis dimension ................... {}", self.dim_z)?;
        write!(f, "Number of iterations ............... {}", self.niter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_in_any_order_with_comments() {
        let p: GlobalProblem = "# run\nniter=2\n\ndim_z = 7\ndim_x=3\ndim_y=5\ndim_x=4\n"
            .parse()
            .unwrap();
        assert_eq!(p, GlobalProblem::new([4, 5, 7], 2));
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let p = GlobalProblem::parse("dim_x=10").unwrap();
        assert_eq!(p, GlobalProblem::new([10, 100, 100], 5));
    }

    #[test]
    fn unknown_key_names_the_line() {
        let err = GlobalProblem::parse("dim_x=1\nsize=3").unwrap_err();
        assert!(matches!(err, StencilError::Config { line: 2, .. }));
        assert!(err.to_string().contains("unknown key `size`"));
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(GlobalProblem::parse("dim_x 4").is_err());
        assert!(GlobalProblem::parse("dim_x=-4").is_err());
        assert!(GlobalProblem::parse("niter=two").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let p = GlobalProblem::load("/nonexistent/halo-stencil/config.txt");
        assert_eq!(p, GlobalProblem::default());
    }

    #[test]
    fn banner_lists_every_field() {
        let text = GlobalProblem::new([1, 2, 3], 4).to_string();
        assert!(text.contains("X-axis dimension ................... 1"));
        assert!(text.ends_with("Number of iterations ............... 4"));
    }

    #[test]
    fn serializes_with_field_names() {
        let json = serde_json::to_string(&GlobalProblem::default()).unwrap();
        assert_eq!(json, r#"{"dim_x":100,"dim_y":100,"dim_z":100,"niter":5}"#);
    }
}
