//! Sampler tests: exact draws from known bit patterns, error reporting, and the
//! shape of the distributions over a long pseudo-random stream.

use msgtree::{BitReader, DecisionReader, EntropySource, IoEntropy, SamplerError};
use proptest::prelude::*;

/// splitmix64, served 64 bits at a time.
struct SplitMix {
    state: u64,
    word: u64,
    bits_left: u32,
}

impl SplitMix {
    fn new(seed: u64) -> Self {
        SplitMix {
            state: seed,
            word: 0,
            bits_left: 0,
        }
    }
}

impl EntropySource for SplitMix {
    fn read_bit(&mut self) -> Option<bool> {
        if self.bits_left == 0 {
            self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = self.state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            self.word = z ^ (z >> 31);
            self.bits_left = 64;
        }
        self.bits_left -= 1;
        Some(self.word & (1 << self.bits_left) != 0)
    }
}

#[test]
fn test_uniform_exact_draws() {
    let mut reader = DecisionReader::new(BitReader::new(&[0xA0]));
    assert_eq!(reader.uniform(8), Ok(5));
    assert_eq!(reader.source().position(), 3);

    let mut reader = DecisionReader::new(BitReader::new(&[0x42]));
    assert_eq!(reader.uniform(256), Ok(0x42));

    // 0b111 is rejected for max 5, the next three bits give 2
    let mut reader = DecisionReader::new(BitReader::new(&[0b1110_1000]));
    assert_eq!(reader.uniform(5), Ok(2));
    assert_eq!(reader.source().position(), 6);
}

#[test]
fn test_uniform_one_consumes_nothing() {
    let mut reader = DecisionReader::new(BitReader::new(&[]));
    assert_eq!(reader.uniform(1), Ok(0));
    assert_eq!(reader.uniform(1), Ok(0));
    assert_eq!(reader.source().position(), 0);
    assert_eq!(reader.uniform(2), Err(SamplerError::Exhausted));
}

#[test]
fn test_invalid_arguments() {
    let mut reader = DecisionReader::new(SplitMix::new(1));
    assert_eq!(reader.uniform(0), Err(SamplerError::InvalidMax(0)));
    assert_eq!(
        reader.exponential(1, 2),
        Err(SamplerError::Degenerate { num: 1, denom: 2 })
    );
    assert!(matches!(reader.exponential(u64::MAX, 3), Err(SamplerError::Degenerate { .. })));
    assert_eq!(reader.custom(&[]), Err(SamplerError::EmptyDistribution));
    assert_eq!(reader.custom(&[0, 0]), Err(SamplerError::EmptyDistribution));
    assert_eq!(reader.custom(&[u64::MAX, 1]), Err(SamplerError::Overflow));
    assert_eq!(reader.custom_real(&[0.0, -1.0]), Err(SamplerError::EmptyDistribution));
    assert_eq!(reader.custom_real(&[f64::NAN]), Err(SamplerError::EmptyDistribution));
    assert!(matches!(
        reader.custom_real(&[1e-30, 1.0]),
        Err(SamplerError::UnmappableScale { .. })
    ));
}

fn draw_sequence<S: EntropySource>(reader: &mut DecisionReader<S>) -> Vec<Result<u64, SamplerError>> {
    [8, 256, 5, 3, 1000, 2, 70000]
        .iter()
        .map(|&max| reader.uniform(max))
        .collect()
}

#[test]
fn test_io_entropy_matches_bit_reader() {
    let data = [0xA0, 0x42, 0xE8, 0x17, 0x99];
    let expected = draw_sequence(&mut DecisionReader::new(BitReader::new(&data)));
    let mut io = DecisionReader::new(IoEntropy::new(std::io::Cursor::new(data.to_vec())));
    assert_eq!(draw_sequence(&mut io), expected);
    assert_eq!(expected, [Ok(5), Ok(2), Ok(0), Ok(2), Ok(928), Ok(0), Err(SamplerError::Exhausted)]);
}

#[test]
fn test_custom_follows_weights() {
    let mut reader = DecisionReader::new(SplitMix::new(0x5eed));
    let mut counts = [0usize; 3];
    for _ in 0..4000 {
        counts[reader.custom(&[1, 1, 2]).expect("draw")] += 1;
    }
    assert!((800..1200).contains(&counts[0]), "{:?}", counts);
    assert!((800..1200).contains(&counts[1]), "{:?}", counts);
    assert!((1800..2200).contains(&counts[2]), "{:?}", counts);

    // zero weight is never drawn
    for _ in 0..200 {
        assert_ne!(reader.custom(&[3, 0, 1]).expect("draw"), 1);
    }
}

#[test]
fn test_custom_real_follows_weights() {
    let mut reader = DecisionReader::new(SplitMix::new(7));
    let mut heavy = 0;
    for _ in 0..2000 {
        match reader.custom_real(&[1.0, -2.0, 3.0]).expect("draw") {
            2 => heavy += 1,
            index => assert_eq!(index, 0),
        }
    }
    assert!((1350..1650).contains(&heavy), "{}", heavy);
}

#[test]
fn test_exponential_mean() {
    let mut reader = DecisionReader::new(SplitMix::new(42));
    let draws = 4000;
    let total: u64 = (0..draws)
        .map(|_| reader.exponential(1, 4).expect("draw"))
        .sum();
    let mean = total as f64 / draws as f64;
    assert!((0.85..1.15).contains(&mean), "{}", mean);

    let mut reader = DecisionReader::new(BitReader::new(&[0x00, 0xC0]));
    // 2-bit draws 00, 00, 00, 00, 11: four successes then a miss
    assert_eq!(reader.exponential(1, 4), Ok(4));
}

proptest! {
    #[test]
    fn prop_uniform_stays_in_range(bytes in proptest::collection::vec(any::<u8>(), 0..16), max in 1u64..5000) {
        let mut reader = DecisionReader::new(BitReader::new(&bytes));
        loop {
            match reader.uniform(max) {
                Ok(value) => prop_assert!(value < max),
                Err(e) => {
                    prop_assert_eq!(e, SamplerError::Exhausted);
                    break;
                }
            }
            if max == 1 {
                break;
            }
        }
    }
}
