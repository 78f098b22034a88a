use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use log::debug;
use crate::config::defs::{PipelineError, ReadRole, FASTA_EXTS, FASTQ_EXTS, LANE_CHUNK_TAG, LANE_FILE_EXTS};

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(buffer == [0x1F, 0x8B]) // Gzip magic bytes
}

/// Enum to hold either an uncompressed or gzipped file reader.
/// Concatenated gzip members are read through to the end.
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = File::open(path)?;
    if gz {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}

/// Trait for records that know how to serialize themselves.
pub trait WriteToFile {
    fn write_to_file<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

/// Splits recognized sequence and compression extensions off a path.
///
/// # Arguments
///
/// * `path` - File path, e.g. `reads/sample.fastq.gz`.
///
/// # Returns
/// Tuple: (path without the extensions, extensions in file order).
///
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let mut stem = path.to_path_buf();
    let mut extensions = Vec::new();

    loop {
        let ext = match stem.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_string(),
            None => break,
        };
        let known = ext.eq_ignore_ascii_case("gz")
            || FASTQ_EXTS.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            || FASTA_EXTS.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        if !known {
            break;
        }
        extensions.insert(0, ext);
        stem.set_extension("");
    }

    (stem, extensions)
}

/// Locates a lane's file for one read role.
/// `<prefix>_<R1|R2|R3>_001.<ext>`, first existing extension wins.
///
/// # Arguments
///
/// * `prefix` - Lane prefix, may include a directory.
/// * `role` - Which of the lane's three files.
///
/// # Returns
/// Result<PathBuf>: existing file, or MissingInput naming the uncompressed candidate.
///
pub fn resolve_lane_file(prefix: &Path, role: ReadRole) -> Result<PathBuf, PipelineError> {
    let base = format!(
        "{}_{}_{}",
        prefix.to_string_lossy(),
        role.lane_tag(),
        LANE_CHUNK_TAG
    );
    for ext in LANE_FILE_EXTS {
        let candidate = PathBuf::from(format!("{}.{}", base, ext));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(PipelineError::MissingInput(PathBuf::from(format!("{}.{}", base, LANE_FILE_EXTS[0]))))
}

/// Sample base for a lane prefix: the file name with a trailing `_L00x` removed.
pub fn lane_sample_base(prefix: &Path) -> String {
    let name = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "amplicon".to_string());
    match name.rsplit_once('_') {
        Some((head, tail)) if tail.len() == 4 && tail.starts_with('L') && tail[1..].chars().all(|c| c.is_ascii_digit()) => {
            head.to_string()
        }
        _ => name,
    }
}

/// Appends the (decompressed) contents of `inputs`, in order, into `output`.
///
/// # Arguments
///
/// * `inputs` - Source files; gzip is detected per file.
/// * `output` - Destination; truncated if it exists.
///
/// # Returns
/// io::Result<u64>: bytes written.
///
pub fn concatenate_files(inputs: &[PathBuf], output: &Path) -> io::Result<u64> {
    for input in inputs {
        if !input.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Input file not found: {}", input.display()),
            ));
        }
    }

    let mut writer = BufWriter::new(File::create(output)?);
    let mut total = 0u64;
    for input in inputs {
        let mut reader = open_reader(input)?;
        let written = io::copy(&mut reader, &mut writer)?;
        debug!("Appended {} bytes from {} to {}", written, input.display(), output.display());
        total += written;
    }
    writer.flush()?;
    Ok(total)
}

/// Counts newline bytes, as `wc -l` does.
pub fn count_lines(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut count = 0u64;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        let len = buf.len();
        reader.consume(len);
    }
    Ok(count)
}

/// Creates `dir` if needed and fails if it already holds anything.
pub fn prepare_empty_dir(dir: &Path) -> Result<(), PipelineError> {
    if dir.exists() {
        if fs::read_dir(dir)?.next().is_some() {
            return Err(PipelineError::OutputExists(dir.to_path_buf()));
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Lists regular files in `dir` ending in `.<ext>`, sorted.
pub fn files_with_extension(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let suffix = format!(".{}", ext);
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(&suffix) && n.len() > suffix.len())
            .unwrap_or(false);
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Renames every `*.<ext>` file in `dir` to `<stem>_<suffix>.<ext>`.
/// All targets are checked before anything moves; a target that matches
/// another target or any existing file aborts the whole rename.
///
/// # Arguments
///
/// * `dir` - Directory of per-sample files.
/// * `ext` - Extension without the dot, e.g. `fastq`.
/// * `suffix` - Tag to append, e.g. `R1`.
///
/// # Returns
/// Renamed paths, sorted.
///
pub fn rename_with_suffix(dir: &Path, ext: &str, suffix: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let sources = files_with_extension(dir, ext)?;
    let existing: HashSet<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;

    let dot_ext = format!(".{}", ext);
    let mut targets = Vec::with_capacity(sources.len());
    let mut seen = HashSet::new();
    for source in &sources {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::IOError(format!("Non UTF-8 file name: {}", source.display())))?;
        let stem = &name[..name.len() - dot_ext.len()];
        let target = dir.join(format!("{}_{}{}", stem, suffix, dot_ext));
        if existing.contains(&target) || !seen.insert(target.clone()) {
            return Err(PipelineError::RenameCollision(target));
        }
        targets.push(target);
    }

    for (source, target) in sources.iter().zip(targets.iter()) {
        debug!("Renaming {} -> {}", source.display(), target.display());
        fs::rename(source, target)?;
    }

    targets.sort();
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents)?;
        Ok(())
    }

    fn gzip_bytes(contents: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents)?;
        encoder.finish()
    }

    #[test]
    fn test_extension_remover() {
        let (stem, exts) = extension_remover(Path::new("dir/sample.A.fastq.gz"));
        assert_eq!(stem, PathBuf::from("dir/sample.A"));
        assert_eq!(exts, vec!["fastq".to_string(), "gz".to_string()]);

        let (stem, exts) = extension_remover(Path::new("mapping.txt"));
        assert_eq!(stem, PathBuf::from("mapping.txt"));
        assert!(exts.is_empty());
    }

    #[test]
    fn test_lane_sample_base() {
        assert_eq!(lane_sample_base(Path::new("raw/Relman_Hypo1a_NoIndex_L001")), "Relman_Hypo1a_NoIndex");
        assert_eq!(lane_sample_base(Path::new("run_LANE")), "run_LANE");
        assert_eq!(lane_sample_base(Path::new("plain")), "plain");
    }

    #[test]
    fn test_resolve_lane_file_prefers_plain_fastq() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let prefix = tmp.path().join("run_L001");
        write_file(&tmp.path().join("run_L001_R2_001.fastq.gz"), b"")?;
        write_file(&tmp.path().join("run_L001_R1_001.fastq"), b"")?;

        assert_eq!(resolve_lane_file(&prefix, ReadRole::Forward)?, tmp.path().join("run_L001_R1_001.fastq"));
        assert_eq!(resolve_lane_file(&prefix, ReadRole::Index)?, tmp.path().join("run_L001_R2_001.fastq.gz"));
        match resolve_lane_file(&prefix, ReadRole::Reverse) {
            Err(PipelineError::MissingInput(path)) => {
                assert_eq!(path, tmp.path().join("run_L001_R3_001.fastq"));
            }
            other => panic!("Expected MissingInput, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_concatenate_preserves_order_and_content() -> io::Result<()> {
        let tmp = TempDir::new()?;
        let a = tmp.path().join("a.fastq");
        let b = tmp.path().join("b.fastq.gz");
        let out = tmp.path().join("out.fastq");
        write_file(&a, b"@r1\nACGT\n+\nIIII\n")?;
        // Two gzip members, as produced by `cat x.gz y.gz`
        let mut gz = gzip_bytes(b"@r2\nGGGG\n+\nIIII\n")?;
        gz.extend(gzip_bytes(b"@r3\nTTTT\n+\nIIII\n")?);
        write_file(&b, &gz)?;

        let written = concatenate_files(&[a, b], &out)?;
        let contents = fs::read_to_string(&out)?;
        assert_eq!(contents, "@r1\nACGT\n+\nIIII\n@r2\nGGGG\n+\nIIII\n@r3\nTTTT\n+\nIIII\n");
        assert_eq!(written, contents.len() as u64);
        Ok(())
    }

    #[test]
    fn test_concatenate_missing_input_creates_nothing() -> io::Result<()> {
        let tmp = TempDir::new()?;
        let out = tmp.path().join("out.fastq");
        let err = concatenate_files(&[tmp.path().join("missing.fastq")], &out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn test_count_lines() -> io::Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("x.fastq");
        write_file(&path, b"@r1\nACGT\n+\nIIII\n@r2\nA\n+\nI\n")?;
        assert_eq!(count_lines(&path)?, 8);
        write_file(&path, b"")?;
        assert_eq!(count_lines(&path)?, 0);
        Ok(())
    }

    #[test]
    fn test_is_gzipped_handles_short_files() -> io::Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("short");
        write_file(&path, b"@")?;
        assert!(!is_gzipped(&path)?);
        write_file(&path, &gzip_bytes(b"@r\nA\n+\nI\n")?)?;
        assert!(is_gzipped(&path)?);
        Ok(())
    }

    #[test]
    fn test_rename_with_suffix_keeps_content() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        write_file(&tmp.path().join("S1.fastq"), b"one")?;
        write_file(&tmp.path().join("S2.fastq"), b"two")?;
        write_file(&tmp.path().join("notes.txt"), b"skip")?;

        let renamed = rename_with_suffix(tmp.path(), "fastq", "R1")?;
        assert_eq!(renamed, vec![tmp.path().join("S1_R1.fastq"), tmp.path().join("S2_R1.fastq")]);
        assert_eq!(fs::read_to_string(&renamed[0])?, "one");
        assert_eq!(fs::read_to_string(&renamed[1])?, "two");
        assert!(!tmp.path().join("S1.fastq").exists());
        assert!(tmp.path().join("notes.txt").exists());
        Ok(())
    }

    #[test]
    fn test_rename_collision_renames_nothing() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        write_file(&tmp.path().join("A.fastq"), b"a")?;
        write_file(&tmp.path().join("A_R2.fastq"), b"a_r2")?;

        match rename_with_suffix(tmp.path(), "fastq", "R2") {
            Err(PipelineError::RenameCollision(path)) => assert_eq!(path, tmp.path().join("A_R2.fastq")),
            other => panic!("Expected RenameCollision, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(tmp.path().join("A.fastq"))?, "a");
        assert_eq!(fs::read_to_string(tmp.path().join("A_R2.fastq"))?, "a_r2");
        Ok(())
    }

    #[test]
    fn test_prepare_empty_dir() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("nested/split");
        prepare_empty_dir(&dir)?;
        assert!(dir.is_dir());
        prepare_empty_dir(&dir)?;
        write_file(&dir.join("x.fastq"), b"")?;
        assert!(matches!(prepare_empty_dir(&dir), Err(PipelineError::OutputExists(_))));
        Ok(())
    }
}
