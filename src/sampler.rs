//! Biased integer sampling driven by an external entropy stream.
//!
//! [`DecisionReader`] turns bits pulled from an [`EntropySource`] into integers that
//! are uniformly distributed, geometrically distributed or follow a custom discrete
//! distribution. It is meant to steer mutation decisions from a fuzzer-provided
//! byte stream, so every draw is reproducible from the stream alone.

use log::warn;
use std::io::Read;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplerError {
    #[error("Invalid maximum: {0}")]
    InvalidMax(u64),
    #[error("Degenerate ratio {num}/{denom}: the draw never stops")]
    Degenerate { num: u64, denom: u64 },
    #[error("Empty distribution")]
    EmptyDistribution,
    #[error("Weights overflow")]
    Overflow,
    #[error("Unmappable scale: {spread:.1} bits of spread, {headroom:.1} bits of headroom")]
    UnmappableScale { spread: f64, headroom: f64 },
    #[error("Entropy source exhausted")]
    Exhausted,
}

/// Stream of random bits.
pub trait EntropySource {
    fn read_bit(&mut self) -> Option<bool>;

    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()? as u8;
        }
        Some(byte)
    }
}

/// Entropy from a byte slice, most significant bit first.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit: 0 }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.bit
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit
    }
}

impl EntropySource for BitReader<'_> {
    fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.bit / 8)?;
        let bit = byte & (0x80 >> (self.bit % 8)) != 0;
        self.bit += 1;
        Some(bit)
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.bit % 8 != 0 {
            let mut byte = 0u8;
            for _ in 0..8 {
                byte = (byte << 1) | self.read_bit()? as u8;
            }
            return Some(byte);
        }
        let byte = *self.data.get(self.bit / 8)?;
        self.bit += 8;
        Some(byte)
    }
}

/// Entropy from any reader (a seed file, a pipe from the fuzzer).
#[derive(Debug)]
pub struct IoEntropy<R: Read> {
    inner: R,
    current: u8,
    bits_left: u8,
}

impl<R: Read> IoEntropy<R> {
    pub fn new(inner: R) -> Self {
        IoEntropy {
            inner,
            current: 0,
            bits_left: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fetch(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => Some(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
            Err(e) => {
                warn!("entropy source failed: {}", e);
                None
            }
        }
    }
}

impl<R: Read> EntropySource for IoEntropy<R> {
    fn read_bit(&mut self) -> Option<bool> {
        if self.bits_left == 0 {
            self.current = self.fetch()?;
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        Some(self.current & (1 << self.bits_left) != 0)
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.bits_left == 0 {
            return self.fetch();
        }
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()? as u8;
        }
        Some(byte)
    }
}

/// Integer draws over an entropy source.
#[derive(Debug)]
pub struct DecisionReader<S: EntropySource> {
    source: S,
}

impl<S: EntropySource> DecisionReader<S> {
    pub fn new(source: S) -> Self {
        DecisionReader { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Uniform draw in `0..max`, by rejection sampling over the smallest bit width
    /// covering `max`. `uniform(1)` is 0 and consumes no entropy.
    pub fn uniform(&mut self, max: u64) -> Result<u64, SamplerError> {
        if max == 0 {
            return Err(SamplerError::InvalidMax(max));
        }
        let width = 64 - (max - 1).leading_zeros();
        loop {
            let mut value = 0u64;
            let mut w = width;
            while w >= 8 {
                value = (value << 8) | self.source.read_byte().ok_or(SamplerError::Exhausted)? as u64;
                w -= 8;
            }
            while w >= 1 {
                value = (value << 1) | self.source.read_bit().ok_or(SamplerError::Exhausted)? as u64;
                w -= 1;
            }
            if value < max {
                return Ok(value);
            }
        }
    }

    /// Number of consecutive `uniform(denom)` draws that land in `0..=num`.
    pub fn exponential(&mut self, num: u64, denom: u64) -> Result<u64, SamplerError> {
        if num.checked_add(1).map_or(true, |n| n >= denom) {
            return Err(SamplerError::Degenerate { num, denom });
        }
        let mut value = 0;
        while self.uniform(denom)? <= num {
            value += 1;
        }
        Ok(value)
    }

    /// Index drawn with probability proportional to its weight.
    pub fn custom(&mut self, weights: &[u64]) -> Result<usize, SamplerError> {
        let sum = weights
            .iter()
            .try_fold(0u64, |acc, &w| acc.checked_add(w))
            .ok_or(SamplerError::Overflow)?;
        if sum == 0 {
            return Err(SamplerError::EmptyDistribution);
        }
        let mut value = self.uniform(sum)?;
        for (index, &weight) in weights.iter().enumerate() {
            if value < weight {
                return Ok(index);
            }
            value -= weight;
        }
        Ok(0)
    }

    /// Like [`DecisionReader::custom`] for real weights. Negative (and NaN) weights
    /// get probability zero. Fails instead of losing resolution when the smallest
    /// positive weight cannot be represented next to the total.
    pub fn custom_real(&mut self, weights: &[f64]) -> Result<usize, SamplerError> {
        let maxint = 0.5 * u64::MAX as f64;
        let mut sum = 0.0;
        let mut min = 0.0f64;
        for &w in weights.iter().filter(|w| **w > 0.0) {
            if min == 0.0 || w < min {
                min = w;
            }
            sum += w;
        }
        if min == 0.0 || !sum.is_finite() {
            return Err(SamplerError::EmptyDistribution);
        }
        let spread = (sum / min).log2();
        let headroom = maxint.log2() - spread;
        if spread > 62.0 || headroom < 3.0 {
            return Err(SamplerError::UnmappableScale { spread, headroom });
        }
        let f = maxint / sum;
        let scaled: Vec<u64> = weights
            .iter()
            .map(|&w| if w > 0.0 { (f * w) as u64 } else { 0 })
            .collect();
        self.custom(&scaled)
    }
}
