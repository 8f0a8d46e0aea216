use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use crate::archive::SampleArchive;

pub struct LocalSampleArchive {
    base_path: PathBuf,
}

impl LocalSampleArchive {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl SampleArchive for LocalSampleArchive {
    fn persist(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let mut components = Path::new(name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sample file name `{}` must be a single path component", name),
            ));
        }

        fs::create_dir_all(&self.base_path)?;
        let file_path = self.base_path.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)?;
        file.write_all(data)?;
        Ok(file_path)
    }
}
