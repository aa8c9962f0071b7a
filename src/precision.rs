//! Numeric precision profiles and deterministic host operand generation.

use std::fmt;

use half::bf16;
use nanorand::{Rng, WyRand};

use crate::error::{BenchError, Operand};

/// Default seed for operand generation, fixed so runs are reproducible.
pub const DEFAULT_SEED: u64 = 0;

/// Upper bound (exclusive) of the generated operand values.
const VALUE_RANGE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    F32,
    Bf16,
}

impl ElementType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::Bf16 => 2,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => f.write_str("f32"),
            ElementType::Bf16 => f.write_str("bf16"),
        }
    }
}

/// Which BLAS entry point a profile drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GemmPath {
    /// Fixed-precision GEMM; the result overwrites operand B.
    Simple,
    /// Mixed-precision GEMM with distinct input/compute/output types, a
    /// dedicated output buffer and operand B transposed.
    Extended,
}

/// Input, compute and output types for one GEMM call, fixed for a whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrecisionProfile {
    pub name: &'static str,
    pub element: ElementType,
    pub compute: ElementType,
    pub output: ElementType,
    pub path: GemmPath,
}

impl PrecisionProfile {
    pub const FP32: Self = Self {
        name: "fp32",
        element: ElementType::F32,
        compute: ElementType::F32,
        output: ElementType::F32,
        path: GemmPath::Simple,
    };

    pub const FP32_EX: Self = Self {
        name: "fp32-ex",
        element: ElementType::F32,
        compute: ElementType::F32,
        output: ElementType::F32,
        path: GemmPath::Extended,
    };

    pub const BF16: Self = Self {
        name: "bf16",
        element: ElementType::Bf16,
        compute: ElementType::F32,
        output: ElementType::Bf16,
        path: GemmPath::Extended,
    };

    pub fn needs_output_buffer(&self) -> bool {
        self.path == GemmPath::Extended
    }

    pub fn transposes_b(&self) -> bool {
        self.path == GemmPath::Extended
    }
}

impl fmt::Display for PrecisionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Host to device-type conversion. bf16 rounds to nearest even; f32 passes through.
/// Bytes are little-endian, the layout every supported device expects.
pub fn encode_element(value: f32, to: ElementType, out: &mut Vec<u8>) {
    match to {
        ElementType::F32 => out.extend_from_slice(&value.to_le_bytes()),
        ElementType::Bf16 => out.extend_from_slice(&bf16::from_f32(value).to_le_bytes()),
    }
}

/// Host-side operands A and B, already encoded in the device element type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostOperands {
    pub element: ElementType,
    pub a: Vec<u8>,
    pub b: Vec<u8>,
}

impl HostOperands {
    /// Fills A then B with integers in `[0, 100)` drawn from one WyRand
    /// seeded with `seed`. Fails without aborting when the host cannot hold
    /// an operand.
    pub fn generate(
        a_elements: usize,
        b_elements: usize,
        element: ElementType,
        seed: u64,
    ) -> Result<Self, BenchError> {
        let mut rng = WyRand::new_seed(seed);
        let mut fill = |operand: Operand, elements: usize| -> Result<Vec<u8>, BenchError> {
            let bytes = elements.saturating_mul(element.size_in_bytes());
            let mut out = Vec::new();
            out.try_reserve_exact(bytes)
                .map_err(|source| BenchError::HostAllocation {
                    operand,
                    bytes,
                    source,
                })?;
            for _ in 0..elements {
                encode_element(rng.generate_range(0..VALUE_RANGE) as f32, element, &mut out);
            }
            Ok(out)
        };
        let a = fill(Operand::A, a_elements)?;
        let b = fill(Operand::B, b_elements)?;

        Ok(Self { element, a, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_f32(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn decode_bf16(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()
    }

    #[test]
    fn same_seed_gives_identical_operands() {
        for element in [ElementType::F32, ElementType::Bf16] {
            let first = HostOperands::generate(64 * 64, 64 * 48, element, DEFAULT_SEED).unwrap();
            let second = HostOperands::generate(64 * 64, 64 * 48, element, DEFAULT_SEED).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn different_seeds_differ() {
        let first = HostOperands::generate(256, 256, ElementType::F32, 0).unwrap();
        let second = HostOperands::generate(256, 256, ElementType::F32, 1).unwrap();
        assert_ne!(first.a, second.a);
    }

    #[test]
    fn values_are_integers_below_one_hundred() {
        let ops = HostOperands::generate(1000, 300, ElementType::F32, DEFAULT_SEED).unwrap();
        assert_eq!(ops.a.len(), 4000);
        assert_eq!(ops.b.len(), 1200);
        for v in decode_f32(&ops.a).into_iter().chain(decode_f32(&ops.b)) {
            assert!((0.0..100.0).contains(&v), "{v} out of range");
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn bf16_holds_the_same_values_as_f32() {
        let wide = HostOperands::generate(500, 500, ElementType::F32, 7).unwrap();
        let narrow = HostOperands::generate(500, 500, ElementType::Bf16, 7).unwrap();
        assert_eq!(narrow.a.len(), 1000);
        // Integers below 256 are exact in bf16.
        assert_eq!(decode_f32(&wide.a), decode_bf16(&narrow.a));
        assert_eq!(decode_f32(&wide.b), decode_bf16(&narrow.b));
    }

    #[test]
    fn bf16_conversion_rounds_to_nearest() {
        let mut out = Vec::new();
        encode_element(1.0, ElementType::Bf16, &mut out);
        assert_eq!(out, 0x3f80u16.to_le_bytes());

        out.clear();
        // 257 is not representable; nearest even is 256.
        encode_element(257.0, ElementType::Bf16, &mut out);
        assert_eq!(bf16::from_le_bytes([out[0], out[1]]).to_f32(), 256.0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_operand_is_an_error_not_an_abort() {
        // 2^62 f32 elements exceed isize::MAX bytes, so the reservation is refused.
        let err = HostOperands::generate(1 << 62, 4, ElementType::F32, DEFAULT_SEED).unwrap_err();
        assert!(matches!(
            err,
            BenchError::HostAllocation {
                operand: Operand::A,
                ..
            }
        ));

        let err = HostOperands::generate(4, usize::MAX, ElementType::Bf16, DEFAULT_SEED).unwrap_err();
        assert!(matches!(
            err,
            BenchError::HostAllocation {
                operand: Operand::B,
                bytes: usize::MAX,
                ..
            }
        ));
    }

    #[test]
    fn profiles_match_their_paths() {
        assert!(!PrecisionProfile::FP32.needs_output_buffer());
        assert!(PrecisionProfile::FP32_EX.needs_output_buffer());
        assert!(PrecisionProfile::BF16.transposes_b());
        assert_eq!(PrecisionProfile::BF16.compute, ElementType::F32);
    }
}
