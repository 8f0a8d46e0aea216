use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::InvalidArgument;

/// Characters a payload byte is drawn from.
pub const PAYLOAD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Characters a filename stem is drawn from.
pub const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

pub const NAME_STEM_LEN: usize = 8;
pub const NAME_EXTENSION: &str = ".txt";

pub const DEFAULT_FILE_COUNT: usize = 5;
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;

/// A synthetic file waiting to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFile {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Produces random sample files. Not cryptographically secure.
pub struct ContentGenerator {
    rng: StdRng,
}

impl ContentGenerator {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Same seed, same files.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn generate(&mut self, count: usize, size: usize) -> Result<Vec<SampleFile>, InvalidArgument> {
        validate(count, size)?;
        Ok((0..count)
            .map(|_| SampleFile {
                name: self.file_name(),
                payload: self.payload(size),
            })
            .collect())
    }

    fn file_name(&mut self) -> String {
        let mut name = String::with_capacity(NAME_STEM_LEN + NAME_EXTENSION.len());
        for _ in 0..NAME_STEM_LEN {
            name.push(self.pick(NAME_ALPHABET) as char);
        }
        name.push_str(NAME_EXTENSION);
        name
    }

    fn payload(&mut self, size: usize) -> Vec<u8> {
        (0..size).map(|_| self.pick(PAYLOAD_ALPHABET)).collect()
    }

    fn pick(&mut self, alphabet: &[u8]) -> u8 {
        alphabet[self.rng.gen_range(0..alphabet.len())]
    }
}

impl Default for ContentGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

pub fn validate(count: usize, size: usize) -> Result<(), InvalidArgument> {
    if count == 0 {
        return Err(InvalidArgument::new("count", "must be at least 1"));
    }
    if size == 0 {
        return Err(InvalidArgument::new("size", "must be at least 1 byte"));
    }
    Ok(())
}
