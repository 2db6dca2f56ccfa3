/// Per query/subject coverage accumulation and finalization
///
/// Records are folded into one interval set per (query, subject) pair. Nothing is
/// computed until `finish`, because later lines may still add segments to any pair.
use crate::blast::{AlignmentRecord, BlastReader};
use crate::error::{CoverageError, Result};
use crate::interval::{covered_bases, merge_intervals, Interval};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

/// Coverage percentage stored as hundredths of a percent.
///
/// `Display` renders the fixed two-decimal form used in output tables (`87.50`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CoveragePercent(u64);

impl CoveragePercent {
    pub const FULL: CoveragePercent = CoveragePercent(10_000);

    pub fn from_hundredths(hundredths: u64) -> Self {
        CoveragePercent(hundredths)
    }

    /// `covered / len * 100` computed in f64, then rounded to two decimals.
    ///
    /// Rounding is half to even on the exact binary value of the f64, the same
    /// result Python's `round(x, 2)` gives, so `23/160` is `14.37` and `49/160` is `30.63`.
    pub fn from_bases(covered: u64, len: u64) -> Result<Self> {
        if len == 0 {
            return Err(CoverageError::Precondition(
                "sequence length must be positive to compute coverage".to_string(),
            ));
        }
        let pct = covered as f64 / len as f64 * 100.0;
        Ok(CoveragePercent(round_hundredths(pct)))
    }

    pub fn hundredths(&self) -> u64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// Round a finite non-negative f64 to a whole number of hundredths.
///
/// The value is decomposed as `m * 2^e`, so `x * 100 = 100m * 2^e` is exact in u128.
fn round_hundredths(x: f64) -> u64 {
    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i64;
    let frac = (bits & ((1u64 << 52) - 1)) as u128;
    let (m, e) = if exp == 0 {
        (frac, -1074)
    } else {
        (frac | (1u128 << 52), exp - 1075)
    };

    let num = m * 100;
    if e >= 0 {
        return (num << e) as u64;
    }
    let shift = -e;
    // num < 2^60, so anything shifted this far rounds to zero
    if shift >= 120 {
        return 0;
    }
    let q = num >> shift;
    let r = num & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    if r > half || (r == half && q & 1 == 1) {
        (q + 1) as u64
    } else {
        q as u64
    }
}

impl fmt::Display for CoveragePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::str::FromStr for CoveragePercent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (whole, frac) = s
            .split_once('.')
            .ok_or_else(|| format!("expected two-decimal percentage, got {s:?}"))?;
        if frac.len() != 2 {
            return Err(format!("expected two-decimal percentage, got {s:?}"));
        }
        let whole: u64 = whole.parse().map_err(|_| format!("invalid percentage {s:?}"))?;
        let frac: u64 = frac.parse().map_err(|_| format!("invalid percentage {s:?}"))?;
        Ok(CoveragePercent(whole * 100 + frac))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageConfig {
    /// Report every (query, subject) pair instead of one subject per query.
    ///
    /// Off by default: each query reports only its last discovered subject.
    pub retain_all_pairs: bool,
}

/// Final coverage numbers for one (query, subject) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageResult {
    pub query_id: String,
    pub query_len: u64,
    pub query_covered_bases: u64,
    pub query_coverage_pct: CoveragePercent,
    pub subject_id: String,
    pub subject_len: u64,
    pub subject_covered_bases: u64,
    pub subject_coverage_pct: CoveragePercent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageSummary {
    pub records: usize,
    pub queries: usize,
    pub pairs: usize,
    pub reported: usize,
}

#[derive(Debug, Clone)]
pub struct CoverageReport {
    pub results: Vec<CoverageResult>,
    pub summary: CoverageSummary,
}

#[derive(Debug, Default)]
struct PairAccumulator {
    query_intervals: Vec<Interval>,
    subject_intervals: Vec<Interval>,
}

#[derive(Debug)]
struct QueryAccumulator {
    query_len: u64,
    subjects: IndexMap<String, PairAccumulator>,
}

/// Owns all accumulated intervals for one input run
#[derive(Debug, Default)]
pub struct CoverageEngine {
    config: CoverageConfig,
    queries: IndexMap<String, QueryAccumulator>,
    subject_lens: HashMap<String, u64>,
    records: usize,
}

impl CoverageEngine {
    pub fn new(config: CoverageConfig) -> Self {
        CoverageEngine {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn records_seen(&self) -> usize {
        self.records
    }

    /// Fold one record into its pair's interval sets
    pub fn add_record(&mut self, record: &AlignmentRecord) -> Result<()> {
        if record.query_len == 0 || record.subject_len == 0 {
            return Err(CoverageError::malformed(
                record.line_no,
                &record.line,
                "sequence lengths must be positive",
            ));
        }

        if let Some(&known) = self.subject_lens.get(&record.subject_id) {
            if known != record.subject_len {
                return Err(CoverageError::malformed(
                    record.line_no,
                    &record.line,
                    format!(
                        "subject {} declared with length {} but earlier with {}",
                        record.subject_id, record.subject_len, known
                    ),
                ));
            }
        }
        if let Some(query) = self.queries.get(&record.query_id) {
            if query.query_len != record.query_len {
                return Err(CoverageError::malformed(
                    record.line_no,
                    &record.line,
                    format!(
                        "query {} declared with length {} but earlier with {}",
                        record.query_id, record.query_len, query.query_len
                    ),
                ));
            }
        }

        self.subject_lens
            .entry(record.subject_id.clone())
            .or_insert(record.subject_len);
        let query = self
            .queries
            .entry(record.query_id.clone())
            .or_insert_with(|| QueryAccumulator {
                query_len: record.query_len,
                subjects: IndexMap::new(),
            });
        let pair = query.subjects.entry(record.subject_id.clone()).or_default();
        pair.query_intervals.push(record.query_interval().into());
        pair.subject_intervals.push(record.subject_interval().into());

        self.records += 1;
        Ok(())
    }

    /// Drain a reader into the engine, stopping at the first malformed record
    pub fn consume<R: BufRead>(&mut self, reader: &mut BlastReader<R>) -> Result<()> {
        while let Some(record) = reader.read_record()? {
            self.add_record(&record)?;
        }
        Ok(())
    }

    /// Merge every reported pair and compute coverage.
    ///
    /// Results follow query discovery order. In the default mode the reported subject
    /// for a query is the last distinct subject seen for it.
    pub fn finish(self) -> Result<CoverageReport> {
        let queries = self.queries.len();
        let pairs = self.queries.values().map(|q| q.subjects.len()).sum();
        let mut results = Vec::new();

        for (query_id, query) in self.queries {
            let n_subjects = query.subjects.len();
            let selected: Vec<(String, PairAccumulator)> = if self.config.retain_all_pairs {
                query.subjects.into_iter().collect()
            } else {
                if n_subjects > 1 {
                    log::debug!(
                        "{query_id}: {n_subjects} subjects, reporting only the last one"
                    );
                }
                query.subjects.into_iter().last().into_iter().collect()
            };

            for (subject_id, pair) in selected {
                let subject_len = self.subject_lens.get(&subject_id).copied().ok_or_else(|| {
                    CoverageError::Precondition(format!("no length recorded for subject {subject_id}"))
                })?;

                let query_covered = covered_bases(&merge_intervals(pair.query_intervals)?);
                let subject_covered = covered_bases(&merge_intervals(pair.subject_intervals)?);

                results.push(CoverageResult {
                    query_coverage_pct: CoveragePercent::from_bases(query_covered, query.query_len)?,
                    subject_coverage_pct: CoveragePercent::from_bases(subject_covered, subject_len)?,
                    query_id: query_id.clone(),
                    query_len: query.query_len,
                    query_covered_bases: query_covered,
                    subject_id,
                    subject_len,
                    subject_covered_bases: subject_covered,
                });
            }
        }

        let summary = CoverageSummary {
            records: self.records,
            queries,
            pairs,
            reported: results.len(),
        };

        Ok(CoverageReport { results, summary })
    }
}

/// Read a whole BLAST tabular stream and compute coverage in one call
pub fn compute_coverage<R: BufRead>(input: R, config: CoverageConfig) -> Result<CoverageReport> {
    let mut reader = BlastReader::new(input);
    let mut engine = CoverageEngine::new(config);
    engine.consume(&mut reader)?;
    engine.finish()
}
