use seq_io::fasta::{Reader as FastaReader, OwnedRecord as FastaOwnedRecord};
use seq_io::fastq::{Reader as FastqReader, OwnedRecord as FastqOwnedRecord};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use crate::config::defs::{FASTA_EXTS, FASTA_TAG, FASTQ_EXTS, FASTQ_TAG};
use crate::utils::file::{extension_remover, open_reader, FileReader, WriteToFile};

/// Defines FASTA and FASTQ as part of a unified FASTX structure.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceRecord {
    Fasta {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
    },
    Fastq {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
    },
}

/// Maps id and seq to the correct file type.
impl SequenceRecord {
    pub fn id(&self) -> &str {
        match self {
            SequenceRecord::Fasta { id, .. } => id,
            SequenceRecord::Fastq { id, .. } => id,
        }
    }

    pub fn seq(&self) -> &[u8] {
        match self {
            SequenceRecord::Fasta { seq, .. } => seq,
            SequenceRecord::Fastq { seq, .. } => seq,
        }
    }
}

impl From<FastaOwnedRecord> for SequenceRecord {
    fn from(record: FastaOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '>');
        SequenceRecord::Fasta {
            id,
            desc,
            seq: record.seq,
        }
    }
}

impl From<FastqOwnedRecord> for SequenceRecord {
    fn from(record: FastqOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '@');
        SequenceRecord::Fastq {
            id,
            desc,
            seq: record.seq,
            qual: record.qual,
        }
    }
}

/// The two sequence file types the splitter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastxType {
    Fasta,
    Fastq,
}

impl FastxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FastxType::Fasta => FASTA_TAG,
            FastxType::Fastq => FASTQ_TAG,
        }
    }
}

impl fmt::Display for FastxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Enum to hold either FASTA or FASTQ reader
pub enum SequenceReader {
    Fasta(FastaReader<FileReader>),
    Fastq(FastqReader<FileReader>),
}

impl SequenceReader {
    /// Owned records, with parse errors surfaced as io::Error.
    pub fn into_sequence_records(self) -> Box<dyn Iterator<Item = io::Result<SequenceRecord>>> {
        match self {
            SequenceReader::Fasta(reader) => Box::new(
                reader
                    .into_records()
                    .map(|r| r.map(SequenceRecord::from).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))),
            ),
            SequenceReader::Fastq(reader) => Box::new(
                reader
                    .into_records()
                    .map(|r| r.map(SequenceRecord::from).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))),
            ),
        }
    }
}

/// Creates a SequenceReader for either FASTA or FASTQ files, typed by extension.
///
/// # Arguments
///
/// * `path`: &Path - Valid path to a fastx file.
///
/// # Returns
/// io::Result<SequenceReader>: Result bearing the correct SequenceReader.
///
pub fn sequence_reader(path: &Path) -> io::Result<SequenceReader> {
    let file_type = fastx_filetype(path)?;
    typed_sequence_reader(path, file_type)
}

/// Creates a SequenceReader with an explicitly declared file type.
pub fn typed_sequence_reader(path: &Path, file_type: FastxType) -> io::Result<SequenceReader> {
    let reader = open_reader(path)?;
    match file_type {
        FastxType::Fasta => Ok(SequenceReader::Fasta(FastaReader::new(reader))),
        FastxType::Fastq => Ok(SequenceReader::Fastq(FastqReader::new(reader))),
    }
}

/// FASTQ reader over a plain or gzipped file.
pub fn fastq_reader(path: &Path) -> io::Result<FastqReader<FileReader>> {
    Ok(FastqReader::new(open_reader(path)?))
}

/// Implementation for SequenceRecord
impl WriteToFile for SequenceRecord {
    fn write_to_file<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            SequenceRecord::Fastq { id, desc, seq, qual } => {
                write_fastq_record(writer, id, desc.as_deref(), seq, qual)
            }
            SequenceRecord::Fasta { id, desc, seq } => {
                write_fasta_record(writer, id, desc.as_deref(), seq)
            }
        }
    }
}

pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
) -> io::Result<()> {
    writer.write_all(b">")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    for chunk in seq.chunks(80) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    writer.write_all(seq)?;
    writer.write_all(b"\n")?;

    writer.write_all(b"+\n")?;

    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Determines if a file path is a FASTA, FASTQ, or neither.
/// Checks extensions, not the body.
///
/// # Arguments
///
/// * `path` - Path of a sequence file, optionally gzipped.
///
/// # Returns
/// io::Result<FastxType>. Ok fastq or fasta, or err.
///
pub fn fastx_filetype(path: &Path) -> io::Result<FastxType> {
    let (_, extensions) = extension_remover(path);

    for ext in &extensions {
        if FASTA_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FastxType::Fasta);
        }

        if FASTQ_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FastxType::Fastq);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!(
            "File '{}' has invalid extension(s) '{:?}'. Expected FASTA ({:?}) or FASTQ ({:?}).",
            path.display(),
            extensions,
            FASTA_EXTS,
            FASTQ_EXTS
        ),
    ))
}

/// Parses a FASTX header.
///
/// # Arguments
///
/// * `head` - Header line of a FASTX record.
/// * 'prefix' - Leading, defining character of the header. > for FASTA, @ for FASTQ.
///
/// # Returns
/// Tuple: (id, desc) split of header on whitespace.
///
pub fn parse_header(head: &[u8], prefix: char) -> (String, Option<String>) {
    let head_str = String::from_utf8_lossy(head);
    let head_str = head_str.trim_start_matches(prefix);
    let mut parts = head_str.splitn(2, |c: char| c.is_whitespace());
    let id = parts.next().unwrap_or("").to_string();
    let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (id, desc)
}

/// Strips an Illumina `/1`, `/2` or `/3` mate suffix from a read id.
fn strip_mate_suffix(id: &str) -> &str {
    for suffix in ["/1", "/2", "/3"] {
        if let Some(base) = id.strip_suffix(suffix) {
            return base;
        }
    }
    id
}

/// Compares the ids of two reads from the same cluster (read vs index read).
/// Only the first whitespace token is compared, after any mate suffix is removed.
///
/// # Arguments
///
/// * `head1`: &[u8] - Header of the first read, with or without the leading '@'.
/// * `head2`: &[u8] - Header of the second read.
///
/// # Returns
/// bool: true if reads come from the same cluster.
///
pub fn compare_read_ids(head1: &[u8], head2: &[u8]) -> bool {
    let (id1, _) = parse_header(head1, '@');
    let (id2, _) = parse_header(head2, '@');
    strip_mate_suffix(&id1) == strip_mate_suffix(&id2)
}

/// Counts the number of records in a FASTA or FASTQ.
///
/// # Arguments
///
/// * `path` - Valid path to a fastx file.
///
/// # Returns
/// u64: Number of records.
///
pub fn record_counter(path: &Path) -> io::Result<u64> {
    let mut counter = 0;
    for record in sequence_reader(path)?.into_sequence_records() {
        record?;
        counter += 1;
    }
    Ok(counter)
}
