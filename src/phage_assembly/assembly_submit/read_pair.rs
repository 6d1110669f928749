use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Name shared by the forward and reverse read files of one sample.
#[derive(Debug, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct SampleId(String);

impl SampleId {
    /// Derives the identifier from the part of `filename` before the
    /// first `delimiter`. A filename without the delimiter is its own
    /// identifier.
    pub fn from_filename(filename: &str, delimiter: &str) -> Result<Self, PairingError> {
        let prefix = if delimiter.is_empty() {
            filename
        } else {
            filename.split(delimiter).next().unwrap_or("")
        };

        if prefix.is_empty() {
            Err(PairingError::EmptyIdentifier(filename.to_string()))
        } else if !prefix.chars().all(Self::is_safe_char) {
            Err(PairingError::UnsafeIdentifier(filename.to_string(), prefix.to_string()))
        } else {
            Ok(SampleId(prefix.to_string()))
        }
    }

    /// Identifiers end up in job names and shell words of the job
    /// script, so they are limited to characters needing no quoting.
    fn is_safe_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '+'
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of a paired-end library a read file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    Forward,
    Reverse,
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mate::Forward => write!(f, "R1"),
            Mate::Reverse => write!(f, "R2"),
        }
    }
}

fn mate_regex() -> &'static Regex {
    static MATE_RE: OnceLock<Regex> = OnceLock::new();
    MATE_RE.get_or_init(|| Regex::new(r"^([Rr])?([12])$").expect("static mate regex"))
}

/// Looks for a mate token in the part of the filename that follows the
/// sample identifier, splitting on `_`, `.` and `-`. An explicit
/// `R1`/`R2` token wins over a bare `1`/`2` (often a lane or
/// replicate number); among tokens of the same kind the last one
/// counts.
pub fn mate_marker(filename: &str, id: &SampleId) -> Option<Mate> {
    let rest = filename.strip_prefix(id.as_str()).unwrap_or(filename);

    let mut explicit = None;
    let mut bare = None;
    for token in rest.split(|c| c == '_' || c == '.' || c == '-') {
        if let Some(caps) = mate_regex().captures(token) {
            let mate = match caps.get(2).map(|m| m.as_str()) {
                Some("1") => Mate::Forward,
                Some("2") => Mate::Reverse,
                _ => continue,
            };
            if caps.get(1).is_some() {
                explicit = Some(mate);
            } else {
                bare = Some(mate);
            }
        }
    }

    explicit.or(bare)
}

/// Forward and reverse read files of one sample. File names are kept
/// as they appear in the input directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    id: SampleId,
    forward: String,
    reverse: String,
    by_marker: bool,
}

impl ReadPair {
    /// Designates mates for two files sharing `id`. Files with distinct
    /// mate markers are ordered by marker; otherwise lexicographically.
    pub fn new(id: SampleId, first: String, second: String) -> Result<Self, PairingError> {
        let (first, second) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };

        match (mate_marker(&first, &id), mate_marker(&second, &id)) {
            (Some(m1), Some(m2)) if m1 == m2 => {
                Err(PairingError::MateConflict(id.to_string(), m1, vec![first, second]))
            }
            (Some(Mate::Reverse), Some(Mate::Forward)) => Ok(ReadPair {
                id: id,
                forward: second,
                reverse: first,
                by_marker: true,
            }),
            (Some(_), Some(_)) => Ok(ReadPair {
                id: id,
                forward: first,
                reverse: second,
                by_marker: true,
            }),
            _ => Ok(ReadPair {
                id: id,
                forward: first,
                reverse: second,
                by_marker: false,
            }),
        }
    }

    pub fn id(&self) -> &SampleId {
        &self.id
    }

    pub fn forward(&self) -> &str {
        &self.forward
    }

    pub fn reverse(&self) -> &str {
        &self.reverse
    }

    /// True when forward and reverse were told apart by an explicit
    /// marker rather than by name order.
    pub fn by_marker(&self) -> bool {
        self.by_marker
    }

    pub fn files(&self) -> [&str; 2] {
        [&self.forward, &self.reverse]
    }
}

impl fmt::Display for ReadPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} + {})", self.id, self.forward, self.reverse)
    }
}

/// Partitions `filenames` into read pairs keyed by sample identifier.
/// Pairs come back sorted by identifier. Every problem found is
/// returned, not just the first one.
pub fn pair_reads<S: AsRef<str>>(
    filenames: &[S],
    delimiter: &str,
) -> Result<Vec<ReadPair>, Vec<PairingError>> {
    let mut groups: BTreeMap<SampleId, Vec<String>> = BTreeMap::new();
    let mut errors = Vec::new();

    for filename in filenames.iter() {
        let filename = filename.as_ref();
        match SampleId::from_filename(filename, delimiter) {
            Ok(id) => match groups.entry(id) {
                Entry::Occupied(mut occ) => occ.get_mut().push(filename.to_string()),
                Entry::Vacant(vac) => {
                    vac.insert(vec![filename.to_string()]);
                }
            },
            Err(e) => errors.push(e),
        }
    }

    let mut pairs = Vec::with_capacity(groups.len());
    for (id, mut files) in groups.into_iter() {
        files.sort();
        match files.len() {
            1 => errors.push(PairingError::UnmatchedMate(id.to_string(), files.remove(0))),
            2 => {
                let second = files.pop().unwrap_or_default();
                let first = files.pop().unwrap_or_default();
                match ReadPair::new(id, first, second) {
                    Ok(pair) => pairs.push(pair),
                    Err(e) => errors.push(e),
                }
            }
            _ => errors.push(PairingError::AmbiguousPairing(id.to_string(), files)),
        }
    }

    if errors.is_empty() {
        Ok(pairs)
    } else {
        Err(errors)
    }
}

/// Lists the read files of `input_dir`: regular files only, hidden
/// files skipped, sorted by name.
pub fn list_read_files(input_dir: &Path) -> Result<Vec<String>, anyhow::Error> {
    let mut names = Vec::new();

    for entry in input_dir.read_dir()? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name.to_string(),
            None => {
                log::warn!("Skipping non-UTF-8 file name {:?}", name);
                continue;
            }
        };

        if name.starts_with('.') {
            log::debug!("Skipping hidden file {}", name);
            continue;
        }

        if !entry.file_type()?.is_file() && !entry.path().is_file() {
            log::debug!("Skipping {}: not a regular file", name);
            continue;
        }

        names.push(name);
    }

    names.sort();
    Ok(names)
}

/// Places `file` under `input_dir` unless it already lives there.
pub fn qualify_path(input_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.starts_with(input_dir) {
        path.to_path_buf()
    } else {
        input_dir.join(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    EmptyIdentifier(String),
    UnmatchedMate(String, String),
    AmbiguousPairing(String, Vec<String>),
    MateConflict(String, Mate, Vec<String>),
    UnsafeIdentifier(String, String),
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PairingError::EmptyIdentifier(name) => {
                write!(f, "No sample identifier in file name \"{}\"", name)
            }
            PairingError::UnmatchedMate(id, name) => write!(
                f,
                "Unmatched mate file: sample \"{}\" has only \"{}\"",
                id, name
            ),
            PairingError::AmbiguousPairing(id, names) => write!(
                f,
                "Ambiguous pairing: sample \"{}\" matches {} files ({})",
                id,
                names.len(),
                names.join(", ")
            ),
            PairingError::UnsafeIdentifier(name, id) => write!(
                f,
                "Sample identifier \"{}\" from \"{}\" has characters other than letters, digits, _ - . +",
                id, name
            ),
            PairingError::MateConflict(id, mate, names) => write!(
                f,
                "Mate conflict: sample \"{}\" has two {} files ({})",
                id,
                mate,
                names.join(", ")
            ),
        }
    }
}

impl error::Error for PairingError {}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::fs;

    #[test]
    fn sample_id_prefix() {
        let id = SampleId::from_filename("SampleA_R1.fastq", "_").unwrap();
        assert_eq!(id.as_str(), "SampleA");

        let whole = SampleId::from_filename("SampleA.fastq", "_").unwrap();
        assert_eq!(whole.as_str(), "SampleA.fastq");

        assert_eq!(
            SampleId::from_filename("_R1.fastq", "_"),
            Err(PairingError::EmptyIdentifier("_R1.fastq".to_string()))
        );
    }

    #[test]
    fn unsafe_identifiers() {
        assert_eq!(
            SampleId::from_filename("my sample_R1.fq", "_"),
            Err(PairingError::UnsafeIdentifier(
                "my sample_R1.fq".to_string(),
                "my sample".to_string()
            ))
        );
        assert!(SampleId::from_filename("a$(rm)_R1.fq", "_").is_err());
        assert!(SampleId::from_filename("x;y_R1.fq", "_").is_err());
        assert!(SampleId::from_filename("Phage-7.b+_R1.fq", "_").is_ok());

        let files = vec!["my sample_R1.fq", "my sample_R2.fq", "ok_R1.fq", "ok_R2.fq"];
        let errors = pair_reads(&files, "_").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, PairingError::UnsafeIdentifier(_, id) if id == "my sample")));
    }

    #[test]
    fn markers() {
        let id = SampleId::from_filename("P12_S3_L001_R2_001.fastq.gz", "_").unwrap();
        assert_eq!(mate_marker("P12_S3_L001_R2_001.fastq.gz", &id), Some(Mate::Reverse));
        assert_eq!(mate_marker("P12_1.fq", &id), Some(Mate::Forward));
        assert_eq!(mate_marker("P12_reads.fq", &id), None);
        // a lane or replicate number does not hide the explicit token
        assert_eq!(mate_marker("P12_2_R1.fastq", &id), Some(Mate::Forward));
        assert_eq!(mate_marker("P12_1_R2.fastq", &id), Some(Mate::Reverse));
        assert_eq!(mate_marker("P12_R2_1.fq", &id), Some(Mate::Reverse));
        assert_eq!(mate_marker("P12_1_2.fq", &id), Some(Mate::Reverse));
        // the identifier itself is never searched for a marker
        let id1 = SampleId::from_filename("R1_a.fq", "_").unwrap();
        assert_eq!(mate_marker("R1_a.fq", &id1), None);
    }

    #[test]
    fn well_formed_partition() {
        let files = vec![
            "SampleB_R2.fastq",
            "SampleA_R1.fastq",
            "SampleC_R1.fastq",
            "SampleB_R1.fastq",
            "SampleA_R2.fastq",
            "SampleC_R2.fastq",
        ];

        let pairs = pair_reads(&files, "_").unwrap();
        assert_eq!(pairs.len(), files.len() / 2);

        let mut seen = HashSet::new();
        for pair in pairs.iter() {
            for file in pair.files().iter() {
                assert!(seen.insert(file.to_string()), "{} assigned twice", file);
            }
        }
        assert_eq!(seen.len(), files.len());

        let ids: Vec<&str> = pairs.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, vec!["SampleA", "SampleB", "SampleC"]);
        assert_eq!(pairs[1].forward(), "SampleB_R1.fastq");
        assert_eq!(pairs[1].reverse(), "SampleB_R2.fastq");
    }

    #[test]
    fn exact_key_not_substring() {
        // "S1" is a substring of "S10" but the two must not collide
        let files = vec!["S1_R1.fq", "S10_R1.fq", "S1_R2.fq", "S10_R2.fq"];
        let pairs = pair_reads(&files, "_").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].files(), ["S1_R1.fq", "S1_R2.fq"]);
        assert_eq!(pairs[1].files(), ["S10_R1.fq", "S10_R2.fq"]);
    }

    #[test]
    fn marker_beats_name_order() {
        let pair = ReadPair::new(
            SampleId("X".to_string()),
            "X_b_R1.fq".to_string(),
            "X_a_R2.fq".to_string(),
        )
        .unwrap();
        assert_eq!(pair.forward(), "X_b_R1.fq");
        assert_eq!(pair.reverse(), "X_a_R2.fq");
        assert!(pair.by_marker());

        let unmarked = ReadPair::new(
            SampleId("X".to_string()),
            "X_reverse.fq".to_string(),
            "X_forward.fq".to_string(),
        )
        .unwrap();
        assert_eq!(unmarked.forward(), "X_forward.fq");
        assert!(!unmarked.by_marker());
    }

    #[test]
    fn unmatched_mate() {
        let files = vec!["SampleA_R1.fastq", "SampleA_R2.fastq", "SampleB_R1.fastq"];
        let errors = pair_reads(&files, "_").unwrap_err();
        assert_eq!(
            errors,
            vec![PairingError::UnmatchedMate(
                "SampleB".to_string(),
                "SampleB_R1.fastq".to_string()
            )]
        );
    }

    #[test]
    fn ambiguous_pairing() {
        let files = vec!["A_R1.fq", "A_R2.fq", "A_R1_extra.fq"];
        match pair_reads(&files, "_").unwrap_err().as_slice() {
            [PairingError::AmbiguousPairing(id, names)] => {
                assert_eq!(id, "A");
                assert_eq!(names.len(), 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn replicate_number_before_marker() {
        let files = vec!["SampleA_2_R2.fastq", "SampleA_2_R1.fastq"];
        let pairs = pair_reads(&files, "_").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].forward(), "SampleA_2_R1.fastq");
        assert_eq!(pairs[0].reverse(), "SampleA_2_R2.fastq");
        assert!(pairs[0].by_marker());
    }

    #[test]
    fn mate_conflict() {
        let files = vec!["A_L1_R1.fq", "A_L2_R1.fq"];
        match pair_reads(&files, "_").unwrap_err().as_slice() {
            [PairingError::MateConflict(id, Mate::Forward, _)] => assert_eq!(id, "A"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn all_errors_reported() {
        let files = vec!["_x.fq", "B_R1.fq", "C_R1.fq", "C_R2.fq", "D_R2.fq"];
        let errors = pair_reads(&files, "_").unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn listing_skips_hidden_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("B_R1.fq"), b"").unwrap();
        fs::write(dir.path().join("A_R1.fq"), b"").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::create_dir(dir.path().join("C_R1.fq")).unwrap();

        let names = list_read_files(dir.path()).unwrap();
        assert_eq!(names, vec!["A_R1.fq".to_string(), "B_R1.fq".to_string()]);
    }

    #[test]
    fn qualify() {
        let input = Path::new("input");
        assert_eq!(qualify_path(input, "A_R1.fq"), PathBuf::from("input/A_R1.fq"));
        assert_eq!(qualify_path(input, "input/A_R1.fq"), PathBuf::from("input/A_R1.fq"));
    }
}
