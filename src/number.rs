// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decimal numbers in canonical form.
//!
//! Stores transmit numbers as decimal strings, so the same value may arrive as
//! `"1"`, `"1.0"` or `"0.1e1"`. [`Number`] normalizes the value once, at
//! construction, so that derived equality and hashing are numeric.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::ParseNumberError;

/// A decimal number without trailing fractional zeros.
///
/// The range and precision are those of [`Decimal`]: 28 significant digits.
/// `-0` is stored as `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Number(Decimal);

impl Number {
    pub fn new(value: Decimal) -> Self {
        Self(value.normalize())
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative()
    }

    pub fn as_decimal(&self) -> &Decimal {
        &self.0
    }
}

fn parse_error(input: &str, e: rust_decimal::Error) -> ParseNumberError {
    if matches!(e, rust_decimal::Error::ErrorString(_)) {
        ParseNumberError::Invalid(input.to_string())
    } else {
        ParseNumberError::OutOfRange(input.to_string())
    }
}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseNumberError::Invalid(String::new()));
        }

        let value = if s.contains(['e', 'E']) {
            Decimal::from_scientific(s)
        } else {
            Decimal::from_str_exact(s)
        };

        value.map(Self::new).map_err(|e| parse_error(s, e))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Decimal> for Number {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Number> for Decimal {
    fn from(value: Number) -> Self {
        value.0
    }
}

impl TryFrom<String> for Number {
    type Error = ParseNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for Number {
    type Error = ParseNumberError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Number> for String {
    fn from(value: Number) -> Self {
        value.to_string()
    }
}

impl TryFrom<f64> for Number {
    type Error = ParseNumberError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(ParseNumberError::NonFinite(value.to_string()));
        }
        Decimal::from_f64(value)
            .map(Self::new)
            .ok_or_else(|| ParseNumberError::OutOfRange(value.to_string()))
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Number {
                fn from(value: $t) -> Self {
                    Number::new(Decimal::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
