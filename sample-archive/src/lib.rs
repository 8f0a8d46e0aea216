pub mod local_archive;
pub mod archive;

pub use archive::SampleArchive;
pub use local_archive::LocalSampleArchive;
