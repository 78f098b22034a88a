use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_distr::{Normal, Distribution};
use crate::config::defs::PHRED_OFFSET;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DNA {
    A,
    C,
    G,
    T,
}

impl DNA {
    /// Convert nucleotide to its character representation.
    pub fn to_char(&self) -> char {
        match self {
            DNA::A => 'A',
            DNA::C => 'C',
            DNA::G => 'G',
            DNA::T => 'T',
        }
    }

    pub fn from_byte(base: u8) -> Option<DNA> {
        match base.to_ascii_uppercase() {
            b'A' => Some(DNA::A),
            b'C' => Some(DNA::C),
            b'G' => Some(DNA::G),
            b'T' => Some(DNA::T),
            _ => None,
        }
    }

    /// Get all possible nucleotides as a static slice.
    pub fn all() -> &'static [DNA] {
        &[DNA::A, DNA::C, DNA::G, DNA::T]
    }

    /// Generate a random sequence of nucleotides of the given length.
    pub fn random_sequence(length: usize, rng: &mut StdRng) -> String {
        (0..length)
            .map(|_| DNA::random_with_rng(rng).to_char())
            .collect()
    }

    fn random_with_rng(rng: &mut StdRng) -> DNA {
        *DNA::all()
            .choose(rng)
            .unwrap_or(&DNA::A)
    }
}

/// Complements a single IUPAC base, keeping case-insensitive input uppercase.
fn complement_base(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'S' => b'S',
        b'W' => b'W',
        _ => b'N',
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement_base(b)).collect()
}

/// Number of differing positions, or None for unequal lengths.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<usize> {
    if a.len() != b.len() {
        return None;
    }
    Some(
        a.iter()
            .zip(b.iter())
            .filter(|(x, y)| !x.eq_ignore_ascii_case(y))
            .count(),
    )
}

/// Seeded RNG for reproducible synthetic reads; OS entropy when no seed.
pub fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn phred33(score: u8) -> u8 {
    score + PHRED_OFFSET
}

/// Decodes a Phred+33 quality character.
pub fn phred_score(qual: u8) -> u8 {
    qual.saturating_sub(PHRED_OFFSET)
}

fn normal_phred_qual(normal: &Normal<f32>, rng: &mut StdRng) -> u8 {
    let mut raw_phred = -1.0;

    while raw_phred < 0.0 || raw_phred > 40.0 {
        raw_phred = normal.sample(rng);
    }

    phred33(raw_phred as u8)
}

pub fn normal_phred_qual_string(length: usize, mean: f32, stdev: f32, rng: &mut StdRng) -> Result<String> {
    let normal = Normal::new(mean, stdev)
        .map_err(|e| anyhow!("Invalid quality distribution ({}, {}): {}", mean, stdev, e))?;

    let mut quals = String::with_capacity(length);
    for _i in 0..length {
        quals.push(normal_phred_qual(&normal, rng) as char);
    }

    Ok(quals)
}
