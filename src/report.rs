/// Coverage table output, and reading it back for downstream joins
///
/// One tab-separated row per reported pair:
/// `#qseqid #qlen #qcov #qcov_percent #sseqid #slen #scov #scov_percent`
use crate::blast::is_skippable;
use crate::coverage::{CoveragePercent, CoverageResult};
use crate::error::{CoverageError, Result};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::str::FromStr;

pub const HEADER: [&str; 8] = [
    "#qseqid",
    "#qlen",
    "#qcov",
    "#qcov_percent",
    "#sseqid",
    "#slen",
    "#scov",
    "#scov_percent",
];

pub fn write_header<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{}", HEADER.join("\t"))?;
    Ok(())
}

pub fn write_row<W: Write>(out: &mut W, r: &CoverageResult) -> Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        r.query_id,
        r.query_len,
        r.query_covered_bases,
        r.query_coverage_pct,
        r.subject_id,
        r.subject_len,
        r.subject_covered_bases,
        r.subject_coverage_pct
    )?;
    Ok(())
}

/// Header followed by every result, in the order given
pub fn write_coverage_table<W: Write>(out: &mut W, results: &[CoverageResult]) -> Result<()> {
    write_header(out)?;
    for r in results {
        write_row(out, r)?;
    }
    Ok(())
}

fn parse_column<T: FromStr>(fields: &[&str], idx: usize, line_no: usize, line: &str) -> Result<T> {
    fields[idx].parse::<T>().map_err(|_| {
        CoverageError::malformed(
            line_no,
            line,
            format!("invalid value for {}: {:?}", HEADER[idx], fields[idx]),
        )
    })
}

/// Parse one data row of a coverage table
pub fn parse_row(line: &str, line_no: usize) -> Result<CoverageResult> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != HEADER.len() {
        return Err(CoverageError::malformed(
            line_no,
            line,
            format!(
                "coverage table rows should have {} columns, but found {}",
                HEADER.len(),
                fields.len()
            ),
        ));
    }

    let pct = |idx: usize| -> Result<CoveragePercent> {
        fields[idx]
            .parse::<CoveragePercent>()
            .map_err(|e| CoverageError::malformed(line_no, line, e))
    };

    Ok(CoverageResult {
        query_id: fields[0].to_string(),
        query_len: parse_column(&fields, 1, line_no, line)?,
        query_covered_bases: parse_column(&fields, 2, line_no, line)?,
        query_coverage_pct: pct(3)?,
        subject_id: fields[4].to_string(),
        subject_len: parse_column(&fields, 5, line_no, line)?,
        subject_covered_bases: parse_column(&fields, 6, line_no, line)?,
        subject_coverage_pct: pct(7)?,
    })
}

/// Coverage rows keyed by query id.
///
/// A query absent from the table had no alignment hit.
#[derive(Debug, Default)]
pub struct CoverageTable {
    rows: Vec<CoverageResult>,
    by_query: HashMap<String, Vec<usize>>,
}

impl CoverageTable {
    pub fn from_results(results: Vec<CoverageResult>) -> Self {
        let mut table = CoverageTable::default();
        for r in results {
            table.push(r);
        }
        table
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = CoverageTable::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if is_skippable(line) {
                continue;
            }
            table.push(parse_row(line, idx + 1)?);
        }
        Ok(table)
    }

    fn push(&mut self, row: CoverageResult) {
        self.by_query
            .entry(row.query_id.clone())
            .or_default()
            .push(self.rows.len());
        self.rows.push(row);
    }

    /// Last row for the query, or `None` when it had no hit
    pub fn get(&self, query_id: &str) -> Option<&CoverageResult> {
        self.by_query
            .get(query_id)
            .and_then(|idx| idx.last())
            .map(|&i| &self.rows[i])
    }

    /// Every row for the query, in file order
    pub fn rows_for(&self, query_id: &str) -> Vec<&CoverageResult> {
        self.by_query
            .get(query_id)
            .map(|idx| idx.iter().map(|&i| &self.rows[i]).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, query_id: &str) -> bool {
        self.by_query.contains_key(query_id)
    }

    pub fn rows(&self) -> &[CoverageResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(q: &str, s: &str) -> CoverageResult {
        CoverageResult {
            query_id: q.to_string(),
            query_len: 20,
            query_covered_bases: 20,
            query_coverage_pct: CoveragePercent::FULL,
            subject_id: s.to_string(),
            subject_len: 300,
            subject_covered_bases: 45,
            subject_coverage_pct: CoveragePercent::from_hundredths(1500),
        }
    }

    #[test]
    fn test_written_table_layout() {
        let mut out = Vec::new();
        write_coverage_table(&mut out, &[result("tr1", "P1")]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "#qseqid\t#qlen\t#qcov\t#qcov_percent\t#sseqid\t#slen\t#scov\t#scov_percent\n\
             tr1\t20\t20\t100.00\tP1\t300\t45\t15.00\n"
        );
    }

    #[test]
    fn test_read_back_and_lookup() {
        let mut out = Vec::new();
        let rows = vec![result("tr1", "P1"), result("tr2", "P2"), result("tr1", "P3")];
        write_coverage_table(&mut out, &rows).unwrap();

        let table = CoverageTable::from_reader(out.as_slice()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows(), rows.as_slice());
        assert_eq!(table.get("tr1").unwrap().subject_id, "P3");
        assert_eq!(table.rows_for("tr1").len(), 2);
        assert!(table.get("tr9").is_none());
        assert!(table.rows_for("tr9").is_empty());
    }

    #[test]
    fn test_short_row_is_malformed() {
        let text = "#qseqid\n tr1\t20\t20\n";
        let err = CoverageTable::from_reader(text.as_bytes()).unwrap_err();
        match err {
            CoverageError::MalformedRecord { line_no, .. } => assert_eq!(line_no, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_percentage_is_malformed() {
        let text = "tr1\t20\t20\t100.0\tP1\t300\t45\t15.00\n";
        assert!(CoverageTable::from_reader(text.as_bytes()).unwrap_err().is_malformed());
    }
}
