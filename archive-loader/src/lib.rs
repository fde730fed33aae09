//! This library is responsible for unpacking submission archives.
//!
//! Every entry is validated against the archive's central directory before a
//! single byte is written, so a rejected archive leaves the destination
//! untouched.

mod signature;

pub use signature::{sniff, sniff_file, APPLICATION_ZIP, DEFAULT_ACCEPTED};

use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};
use zip::ZipArchive;

/// Entries whose declared sizes imply a larger ratio are treated as zip bombs.
pub const MAX_COMPRESSION_RATIO: f64 = 100.0;

/// Default extraction budget: 100 MiB.
pub const DEFAULT_MAX_EXTRACTED_SIZE: u64 = 100 * 1024 * 1024;

/// Why an archive was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("content type {detected} is not accepted")]
    BadContentType { detected: String },
    #[error("archive is corrupt")]
    Corrupt(#[source] zip::result::ZipError),
    #[error("extraction destination {} is not an existing directory", .0.display())]
    DestinationNotDirectory(PathBuf),
    #[error("unsafe path in archive: {entry}")]
    PathTraversal { entry: String },
    #[error("suspicious compression ratio {ratio:.1} for entry {entry}")]
    CompressionRatio { entry: String, ratio: f64 },
    #[error("archive too large when extracted: {total} bytes exceed budget of {budget} bytes")]
    SizeBudgetExceeded { total: u64, budget: u64 },
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Limits applied to submissions.
#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    /// Sum of uncompressed entry sizes, in bytes
    pub max_extracted_size: u64,
    pub accepted_content_types: Vec<String>,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        ExtractionPolicy {
            max_extracted_size: DEFAULT_MAX_EXTRACTED_SIZE,
            accepted_content_types: DEFAULT_ACCEPTED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What was written by a successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

pub struct Extractor {
    policy: ExtractionPolicy,
}

impl Extractor {
    pub fn new(policy: ExtractionPolicy) -> Extractor {
        Extractor { policy }
    }

    pub fn policy(&self) -> &ExtractionPolicy {
        &self.policy
    }

    /// Validates `archive` and unpacks it into `destination`.
    #[tracing::instrument(skip_all, fields(archive = %archive.display(), destination = %destination.display()))]
    pub fn extract(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> Result<ExtractionSummary, ArchiveError> {
        let detected = sniff_file(archive).map_err(ArchiveError::io(archive))?;
        if !self
            .policy
            .accepted_content_types
            .iter()
            .any(|accepted| accepted == detected)
        {
            return Err(ArchiveError::BadContentType {
                detected: detected.to_string(),
            });
        }

        let file = File::open(archive).map_err(ArchiveError::io(archive))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(ArchiveError::Corrupt)?;

        if !destination.is_dir() {
            return Err(ArchiveError::DestinationNotDirectory(
                destination.to_path_buf(),
            ));
        }

        let declared = self.validate_entries(&mut zip)?;
        tracing::debug!(
            entries = zip.len(),
            declared_bytes = declared,
            "archive passed validation"
        );

        let mut created = Vec::new();
        match self.unpack(&mut zip, destination, &mut created) {
            Ok(summary) => {
                tracing::info!(
                    files = summary.files,
                    bytes = summary.bytes,
                    "submission extracted"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::warn!(error = %err, "extraction failed, removing partial output");
                remove_created(&created);
                Err(err)
            }
        }
    }

    /// Walks the central directory only. Returns declared uncompressed size.
    fn validate_entries<R: Read + io::Seek>(
        &self,
        zip: &mut ZipArchive<R>,
    ) -> Result<u64, ArchiveError> {
        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let entry = zip.by_index_raw(i).map_err(ArchiveError::Corrupt)?;
            let name = entry.name();
            if is_unsafe_name(name) {
                return Err(ArchiveError::PathTraversal {
                    entry: name.to_string(),
                });
            }
            let compressed = entry.compressed_size();
            let uncompressed = entry.size();
            if compressed > 0 {
                let ratio = uncompressed as f64 / compressed as f64;
                if ratio > MAX_COMPRESSION_RATIO {
                    return Err(ArchiveError::CompressionRatio {
                        entry: name.to_string(),
                        ratio,
                    });
                }
            }
            total = total.saturating_add(uncompressed);
            if total > self.policy.max_extracted_size {
                return Err(ArchiveError::SizeBudgetExceeded {
                    total,
                    budget: self.policy.max_extracted_size,
                });
            }
        }
        Ok(total)
    }

    fn unpack<R: Read + io::Seek>(
        &self,
        zip: &mut ZipArchive<R>,
        destination: &Path,
        created: &mut Vec<PathBuf>,
    ) -> Result<ExtractionSummary, ArchiveError> {
        let budget = self.policy.max_extracted_size;
        let mut summary = ExtractionSummary::default();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(ArchiveError::Corrupt)?;
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| ArchiveError::PathTraversal {
                    entry: entry.name().to_string(),
                })?;
            let out_path = destination.join(relative);

            if entry.is_dir() {
                create_dirs(&out_path, created)?;
                summary.directories += 1;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                create_dirs(parent, created)?;
            }
            let mut out = File::create(&out_path).map_err(ArchiveError::io(&out_path))?;
            created.push(out_path.clone());
            // declared sizes may lie, so the budget is enforced on real bytes too
            let remaining = budget - summary.bytes.min(budget);
            let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
                .map_err(ArchiveError::io(&out_path))?;
            if written > remaining {
                return Err(ArchiveError::SizeBudgetExceeded {
                    total: summary.bytes + written,
                    budget,
                });
            }
            summary.bytes += written;
            summary.files += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let perms = fs::Permissions::from_mode((mode & 0o777) | 0o600);
                    fs::set_permissions(&out_path, perms).map_err(ArchiveError::io(&out_path))?;
                }
            }
        }
        Ok(summary)
    }
}

/// Absolute names (including Windows drive and UNC forms) and names with a
/// `..` segment are rejected.
fn is_unsafe_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    name.split(|c| c == '/' || c == '\\').any(|segment| segment == "..")
}

fn create_dirs(path: &Path, created: &mut Vec<PathBuf>) -> Result<(), ArchiveError> {
    let mut missing = Vec::new();
    let mut cur = Some(path);
    while let Some(p) = cur {
        if p.exists() {
            break;
        }
        missing.push(p.to_path_buf());
        cur = p.parent();
    }
    fs::create_dir_all(path).map_err(ArchiveError::io(path))?;
    created.extend(missing.into_iter().rev());
    Ok(())
}

fn remove_created(created: &[PathBuf]) {
    for path in created.iter().rev() {
        let res = if path.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(err) = res {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove partially extracted entry");
        }
    }
}
