use std::path::PathBuf;

/// Somewhere generated sample files are kept for later inspection.
pub trait SampleArchive {
    /// Writes `data` under `name`, replacing any earlier file of that name.
    fn persist(&self, name: &str, data: &[u8]) -> std::io::Result<PathBuf>;
}
