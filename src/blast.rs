use crate::error::{CoverageError, Result};
use flate2::read::MultiGzDecoder;
use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Number of columns in the recommended BLAST tabular format:
/// `-outfmt "6 qseqid sseqid pident qstart qend sstart send qlen slen length nident mismatch positive gapopen gaps evalue bitscore"`
pub const BLAST_COLUMNS: usize = 17;

/// Open a BLAST tabular file, returning a boxed BufRead.
///
/// `-` reads stdin. Compression is picked from the extension: `.bgz` goes through
/// the bgzf reader, `.gz` through a multi-member gzip decoder (which also accepts bgzip).
pub fn open_blast_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path)?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("bgz") => Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(file)))),
        Some("gz") => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// Alignment statistics carried through from the tabular row, kept as written.
///
/// None of these feed the coverage computation, so they are never validated.
/// The accessors parse on demand and return `None` for values like `N/A`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignmentStats {
    pub pct_identity: String,
    pub aln_len: String,
    pub n_identical: String,
    pub n_mismatch: String,
    pub n_positive: String,
    pub n_gapopen: String,
    pub n_gaps: String,
    pub evalue: String,
    pub bitscore: String,
}

impl AlignmentStats {
    pub fn pct_identity(&self) -> Option<f64> {
        self.pct_identity.trim().parse().ok()
    }

    pub fn evalue(&self) -> Option<f64> {
        self.evalue.trim().parse().ok()
    }

    pub fn bitscore(&self) -> Option<f64> {
        self.bitscore.trim().parse().ok()
    }
}

/// One aligned segment between a query and a subject.
///
/// Coordinates are 1-based inclusive and always normalized so that start <= end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub line_no: usize,
    /// The input line as read, without its terminator
    pub line: String,
    pub query_id: String,
    pub subject_id: String,
    pub query_start: u64,
    pub query_end: u64,
    pub subject_start: u64,
    pub subject_end: u64,
    pub query_len: u64,
    pub subject_len: u64,
    pub stats: AlignmentStats,
}

impl AlignmentRecord {
    pub fn query_interval(&self) -> (u64, u64) {
        (self.query_start, self.query_end)
    }

    pub fn subject_interval(&self) -> (u64, u64) {
        (self.subject_start, self.subject_end)
    }
}

/// Blank lines and `#` comment/header lines carry no record
pub fn is_skippable(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

fn parse_field<T: FromStr>(
    fields: &[&str],
    idx: usize,
    name: &str,
    line_no: usize,
    line: &str,
) -> Result<T> {
    let raw = fields[idx].trim();
    raw.parse::<T>().map_err(|_| {
        CoverageError::malformed(line_no, line, format!("invalid {name} in column {}: {raw:?}", idx + 1))
    })
}

fn parse_length(fields: &[&str], idx: usize, name: &str, line_no: usize, line: &str) -> Result<u64> {
    let len: u64 = parse_field(fields, idx, name, line_no, line)?;
    if len == 0 {
        return Err(CoverageError::malformed(
            line_no,
            line,
            format!("{name} must be positive"),
        ));
    }
    Ok(len)
}

/// Order a coordinate pair so start <= end (reverse-strand hits report start > end)
fn normalize(start: u64, end: u64) -> (u64, u64) {
    if start > end {
        (end, start)
    } else {
        (start, end)
    }
}

/// Parse one line of BLAST tabular output (line terminator already removed).
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_blast_line(line: &str, line_no: usize) -> Result<Option<AlignmentRecord>> {
    if is_skippable(line) {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != BLAST_COLUMNS {
        return Err(CoverageError::malformed(
            line_no,
            line,
            format!(
                "BLAST tabular output should have {BLAST_COLUMNS} columns, but found {}",
                fields.len()
            ),
        ));
    }

    let query_id = fields[0];
    let subject_id = fields[1];
    if query_id.is_empty() || subject_id.is_empty() {
        return Err(CoverageError::malformed(
            line_no,
            line,
            "query and subject ids must be non-empty",
        ));
    }

    let q_start: u64 = parse_field(&fields, 3, "query start", line_no, line)?;
    let q_end: u64 = parse_field(&fields, 4, "query end", line_no, line)?;
    let s_start: u64 = parse_field(&fields, 5, "subject start", line_no, line)?;
    let s_end: u64 = parse_field(&fields, 6, "subject end", line_no, line)?;
    let query_len = parse_length(&fields, 7, "query length", line_no, line)?;
    let subject_len = parse_length(&fields, 8, "subject length", line_no, line)?;

    let (query_start, query_end) = normalize(q_start, q_end);
    let (subject_start, subject_end) = normalize(s_start, s_end);

    if query_start == 0 || subject_start == 0 {
        return Err(CoverageError::malformed(
            line_no,
            line,
            "coordinates are 1-based, found 0",
        ));
    }
    if query_end > query_len {
        return Err(CoverageError::malformed(
            line_no,
            line,
            format!("query end {query_end} exceeds query length {query_len}"),
        ));
    }
    if subject_end > subject_len {
        return Err(CoverageError::malformed(
            line_no,
            line,
            format!("subject end {subject_end} exceeds subject length {subject_len}"),
        ));
    }

    let stats = AlignmentStats {
        pct_identity: fields[2].to_string(),
        aln_len: fields[9].to_string(),
        n_identical: fields[10].to_string(),
        n_mismatch: fields[11].to_string(),
        n_positive: fields[12].to_string(),
        n_gapopen: fields[13].to_string(),
        n_gaps: fields[14].to_string(),
        evalue: fields[15].to_string(),
        bitscore: fields[16].to_string(),
    };

    Ok(Some(AlignmentRecord {
        line_no,
        line: line.to_string(),
        query_id: query_id.to_string(),
        subject_id: subject_id.to_string(),
        query_start,
        query_end,
        subject_start,
        subject_end,
        query_len,
        subject_len,
        stats,
    }))
}

/// Streaming reader over BLAST tabular text, skipping blank and comment lines
pub struct BlastReader<R: BufRead> {
    reader: R,
    line: String,
    line_no: usize,
}

impl<R: BufRead> BlastReader<R> {
    pub fn new(reader: R) -> Self {
        BlastReader {
            reader,
            line: String::new(),
            line_no: 0,
        }
    }

    /// Number of physical lines read so far
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if let Some(record) = parse_blast_line(trimmed, self.line_no)? {
                return Ok(Some(record));
            }
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<AlignmentRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl<R: BufRead> Iterator for BlastReader<R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str =
        "tr1\tsp|P1|A\t87.5\t1\t100\t11\t110\t120\t300\t100\t87\t13\t90\t0\t0\t1e-30\t180.2";

    #[test]
    fn test_parse_well_formed_line() {
        let rec = parse_blast_line(LINE, 3).unwrap().unwrap();
        assert_eq!(rec.line_no, 3);
        assert_eq!(rec.query_id, "tr1");
        assert_eq!(rec.subject_id, "sp|P1|A");
        assert_eq!(rec.query_interval(), (1, 100));
        assert_eq!(rec.subject_interval(), (11, 110));
        assert_eq!(rec.query_len, 120);
        assert_eq!(rec.subject_len, 300);
        assert_eq!(rec.line, LINE);
        assert_eq!(rec.stats.n_identical, "87");
        assert_eq!(rec.stats.evalue, "1e-30");
        assert_eq!(rec.stats.evalue(), Some(1e-30));
    }

    #[test]
    fn test_reverse_coordinates_are_swapped() {
        let line = "q\ts\t90\t50\t10\t200\t150\t100\t300\t41\t37\t4\t40\t0\t0\t1e-5\t60";
        let rec = parse_blast_line(line, 1).unwrap().unwrap();
        assert_eq!(rec.query_interval(), (10, 50));
        assert_eq!(rec.subject_interval(), (150, 200));
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        assert!(parse_blast_line("", 1).unwrap().is_none());
        assert!(parse_blast_line("   \t ", 2).unwrap().is_none());
        assert!(parse_blast_line("# BLASTP 2.12.0+", 3).unwrap().is_none());
    }

    #[test]
    fn test_wrong_column_count_is_malformed() {
        let line = "q\ts\t90\t1\t10\t1\t10\t100\t100\t10";
        let err = parse_blast_line(line, 7).unwrap_err();
        match err {
            CoverageError::MalformedRecord { line_no, line: l, reason } => {
                assert_eq!(line_no, 7);
                assert_eq!(l, line);
                assert!(reason.contains("17 columns"), "{reason}");
                assert!(reason.contains("found 10"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_length_is_malformed() {
        let line = "q\ts\t90\t1\t10\t1\t10\t0\t100\t10\t9\t1\t9\t0\t0\t1e-5\t20";
        assert!(parse_blast_line(line, 1).unwrap_err().is_malformed());
    }

    #[test]
    fn test_non_numeric_coordinate_is_malformed() {
        let line = "q\ts\t90\tone\t10\t1\t10\t100\t100\t10\t9\t1\t9\t0\t0\t1e-5\t20";
        let err = parse_blast_line(line, 1).unwrap_err();
        assert!(err.to_string().contains("query start"), "{err}");
    }

    #[test]
    fn test_coordinate_past_length_is_malformed() {
        let line = "q\ts\t90\t1\t101\t1\t10\t100\t100\t10\t9\t1\t9\t0\t0\t1e-5\t20";
        assert!(parse_blast_line(line, 1).unwrap_err().is_malformed());
    }

    #[test]
    fn test_reader_tracks_line_numbers_and_crlf() {
        let text = format!("# header\r\n\r\n{LINE}\r\n{LINE}\n");
        let mut reader = BlastReader::new(text.as_bytes());
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_no, 3);
        assert_eq!(records[1].line_no, 4);
        assert_eq!(records[1].stats.bitscore(), Some(180.2));
        assert_eq!(records[1].line, LINE);
        assert_eq!(reader.lines_read(), 4);
    }

    #[test]
    fn test_unparseable_statistics_pass_through() {
        let line = "q\ts\tN/A\t1\t10\t1\t10\t100\t100\t-\t-\t-\t-\t-\t-\tNA\t*";
        let rec = parse_blast_line(line, 1).unwrap().unwrap();
        assert_eq!(rec.query_interval(), (1, 10));
        assert_eq!(rec.stats.pct_identity, "N/A");
        assert_eq!(rec.stats.evalue, "NA");
        assert_eq!(rec.stats.pct_identity(), None);
        assert_eq!(rec.stats.evalue(), None);
        assert_eq!(rec.stats.bitscore(), None);
    }
}
