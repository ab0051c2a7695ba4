// Machine Words
// =============
// One trait over the unsigned integer widths the engine supports, so the
// square-pair code is written once instead of per width.

use rand::Rng;

/// An unsigned machine word of one of the supported widths
/// (8, 16, 32, 64 or 128 bits). All arithmetic is modulo 2^BITS.
pub trait SpWord:
    Copy + Eq + Ord + std::fmt::Debug + Default + Send + Sync + 'static
{
    const BITS: usize;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn wrapping_shl(self, shift: u32) -> Self;

    /// Returns bit `index`, bit 0 being the least significant.
    fn bit(self, index: usize) -> bool;

    /// Zero-extends into a u128.
    fn to_u128(self) -> u128;

    /// Truncates a u128 down to this width.
    fn from_u128(value: u128) -> Self;

    /// Samples uniformly from {0, ..., 2^BITS - 1}.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

macro_rules! impl_sp_word {
    ($($ty:ty),*) => {$(
        impl SpWord for $ty {
            const BITS: usize = <$ty>::BITS as usize;

            fn wrapping_add(self, rhs: Self) -> Self {
                <$ty>::wrapping_add(self, rhs)
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                <$ty>::wrapping_sub(self, rhs)
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                <$ty>::wrapping_mul(self, rhs)
            }

            fn wrapping_shl(self, shift: u32) -> Self {
                <$ty>::wrapping_shl(self, shift)
            }

            fn bit(self, index: usize) -> bool {
                assert!(index < <Self as SpWord>::BITS, "bit index {index} out of range");
                self >> index & 1 == 1
            }

            fn to_u128(self) -> u128 {
                self as u128
            }

            fn from_u128(value: u128) -> Self {
                value as $ty
            }

            fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
                rng.random::<$ty>()
            }
        }
    )*};
}

impl_sp_word!(u8, u16, u32, u64, u128);
