//! Turns `ROWS,COLUMNS` command-line tokens into an ordered list of benchmark jobs.

use std::{fmt, num::ParseIntError, str::FromStr};

use thiserror::Error;

/// One matrix size to benchmark. Both dimensions are always non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BenchmarkJob {
    pub rows: usize,
    pub columns: usize,
}

impl BenchmarkJob {
    pub fn new(rows: usize, columns: usize) -> Result<Self, PlanError> {
        if rows == 0 || columns == 0 {
            return Err(PlanError::ZeroDimension);
        }
        Ok(Self { rows, columns })
    }
}

impl fmt::Display for BenchmarkJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("expected ROWS,COLUMNS")]
    MissingComma,
    #[error("too many fields, expected ROWS,COLUMNS")]
    TooManyFields,
    #[error("invalid {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("dimensions must be greater than zero")]
    ZeroDimension,
}

impl FromStr for BenchmarkJob {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rows, columns) = s.split_once(',').ok_or(PlanError::MissingComma)?;
        if columns.contains(',') {
            return Err(PlanError::TooManyFields);
        }

        let parse = |field: &'static str, value: &str| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|source| PlanError::InvalidNumber { field, source })
        };

        BenchmarkJob::new(parse("rows", rows)?, parse("columns", columns)?)
    }
}

/// A command-line argument that did not describe a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejected {
    pub argument: String,
    pub reason: PlanError,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SizePlan {
    pub jobs: Vec<BenchmarkJob>,
    pub rejected: Vec<Rejected>,
}

/// Parses every argument independently, keeping argument order. Malformed
/// arguments are skipped and collected in [`SizePlan::rejected`].
pub fn parse_size_plan<I, S>(args: I) -> SizePlan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plan = SizePlan::default();
    for arg in args {
        let arg = arg.as_ref();
        match arg.parse::<BenchmarkJob>() {
            Ok(job) => plan.jobs.push(job),
            Err(reason) => plan.rejected.push(Rejected {
                argument: arg.to_owned(),
                reason,
            }),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job(rows: usize, columns: usize) -> BenchmarkJob {
        BenchmarkJob { rows, columns }
    }

    #[test]
    fn keeps_argument_order() {
        let plan = parse_size_plan(["10,20", "5,5"]);
        assert_eq!(plan.jobs, vec![job(10, 20), job(5, 5)]);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn does_not_dedup() {
        let plan = parse_size_plan(["8,8", "8,8"]);
        assert_eq!(plan.jobs, vec![job(8, 8), job(8, 8)]);
    }

    #[test]
    fn trims_whitespace_around_fields() {
        assert_eq!(" 64 , 32 ".parse::<BenchmarkJob>(), Ok(job(64, 32)));
    }

    #[test]
    fn malformed_arguments_are_skipped() {
        let plan = parse_size_plan(["abc", "1024,1024", "12", "3,x", "-4,4", "0,16", "1,2,3"]);
        assert_eq!(plan.jobs, vec![job(1024, 1024)]);

        let reasons: Vec<_> = plan
            .rejected
            .iter()
            .map(|r| (r.argument.as_str(), r.reason.clone()))
            .collect();
        assert_eq!(reasons[0], ("abc", PlanError::MissingComma));
        assert_eq!(reasons[1], ("12", PlanError::MissingComma));
        assert!(matches!(
            reasons[2].1,
            PlanError::InvalidNumber { field: "columns", .. }
        ));
        assert!(matches!(
            reasons[3].1,
            PlanError::InvalidNumber { field: "rows", .. }
        ));
        assert_eq!(reasons[4], ("0,16", PlanError::ZeroDimension));
        assert_eq!(reasons[5], ("1,2,3", PlanError::TooManyFields));
    }

    #[test]
    fn empty_argument_list_is_an_empty_plan() {
        let plan = parse_size_plan(Vec::<String>::new());
        assert_eq!(plan, SizePlan::default());
    }

    proptest! {
        #[test]
        fn well_formed_pairs_round_trip(rows in 1usize..1 << 20, columns in 1usize..1 << 20) {
            let arg = format!("{rows},{columns}");
            let plan = parse_size_plan([arg]);
            prop_assert_eq!(plan.jobs, vec![job(rows, columns)]);
        }

        #[test]
        fn never_yields_a_zero_dimension(arg in "\\PC*") {
            for job in parse_size_plan([arg]).jobs {
                prop_assert!(job.rows > 0 && job.columns > 0);
            }
        }
    }
}
