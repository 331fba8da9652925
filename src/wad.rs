//! Fixed-point WAD (1e18-scaled) arithmetic.
//!
//! Every monetary amount that crosses an engine boundary is a [`Wad`].
//! Conversion to/from a token's native decimals only happens at the
//! token boundary (approvals, transfers, balance reads) per the data
//! model invariant in the spec.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use ethers::types::U256;

pub const WAD_DECIMALS: u32 = 18;

lazy_static::lazy_static! {
    pub static ref WAD: U256 = U256::exp10(WAD_DECIMALS as usize);
    pub static ref HALF_WAD: U256 = *WAD / 2;
}

/// A WAD-scaled (1e18 fractional digits) fixed-point amount backed by a
/// 256-bit integer, matching the protocol's own on-chain representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Wad(pub U256);

impl Wad {
    pub const ZERO: Wad = Wad(U256::zero());

    pub fn from_raw(raw: U256) -> Self {
        Wad(raw)
    }

    pub fn raw(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Build a WAD amount from an `f64` (only ever used at oracle / CLI /
    /// logging boundaries, never inside the engines).
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value < 0.0 {
            return Wad::ZERO;
        }
        let scaled = value * 1e18;
        Wad(U256::from(scaled as u128))
    }

    pub fn to_f64(self) -> f64 {
        // safe: token economics never approach u128::MAX WAD units.
        let low = self.0.low_u128();
        low as f64 / 1e18
    }

    /// Convert a token-native amount (given its decimals) into WAD.
    pub fn from_token_amount(amount: U256, decimals: u8) -> Self {
        if decimals as u32 == WAD_DECIMALS {
            return Wad(amount);
        }
        if (decimals as u32) < WAD_DECIMALS {
            let scale = U256::exp10((WAD_DECIMALS - decimals as u32) as usize);
            Wad(amount * scale)
        } else {
            let scale = U256::exp10((decimals as u32 - WAD_DECIMALS) as usize);
            Wad(amount / scale)
        }
    }

    /// Convert a WAD amount back into a token's native decimals.
    pub fn to_token_amount(self, decimals: u8) -> U256 {
        if decimals as u32 == WAD_DECIMALS {
            return self.0;
        }
        if (decimals as u32) < WAD_DECIMALS {
            let scale = U256::exp10((WAD_DECIMALS - decimals as u32) as usize);
            self.0 / scale
        } else {
            let scale = U256::exp10((decimals as u32 - WAD_DECIMALS) as usize);
            self.0 * scale
        }
    }

    pub fn wad_mul(self, other: Wad) -> Wad {
        Wad((self.0 * other.0 + *HALF_WAD) / *WAD)
    }

    pub fn wad_div(self, other: Wad) -> Wad {
        if other.is_zero() {
            return Wad::ZERO;
        }
        let half_b = other.0 / 2;
        Wad((self.0 * *WAD + half_b) / other.0)
    }

    /// Invert the price (1/x), returning zero when `self` is zero rather
    /// than dividing by zero (matches the Price Resolver's `invert` rule).
    pub fn inverse(self) -> Wad {
        if self.is_zero() {
            return Wad::ZERO;
        }
        Wad::from_raw(*WAD).wad_div(self)
    }

    /// Saturating subtraction that clamps to zero instead of underflowing;
    /// used by reward-bucket bookkeeping per the data model invariant.
    pub fn saturating_sub(self, other: Wad) -> Wad {
        if self.0 >= other.0 {
            Wad(self.0 - other.0)
        } else {
            Wad::ZERO
        }
    }
}

impl Add for Wad {
    type Output = Wad;
    fn add(self, rhs: Wad) -> Wad {
        Wad(self.0 + rhs.0)
    }
}

impl Sub for Wad {
    type Output = Wad;
    fn sub(self, rhs: Wad) -> Wad {
        Wad(self.0 - rhs.0)
    }
}

impl Mul<u64> for Wad {
    type Output = Wad;
    fn mul(self, rhs: u64) -> Wad {
        Wad(self.0 * U256::from(rhs))
    }
}

impl Div<u64> for Wad {
    type Output = Wad;
    fn div(self, rhs: u64) -> Wad {
        Wad(self.0 / U256::from(rhs))
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}
