// Copyright 2024 The Kubernetes Authors.
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

//! Parsing for Kubernetes resource quantities ("500m", "256Mi", "2e3").
//!
//! Only the comparison semantics the limits auditor needs are implemented:
//! a quantity parses to its canonical value and quantities compare by it.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QuantityError {
    #[error("invalid quantity {0:?}")]
    Invalid(String),
}

/// A parsed quantity, comparable by canonical value (bytes for memory,
/// cores for CPU).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ParsedQuantity(f64);

impl ParsedQuantity {
    pub fn value(&self) -> f64 {
        self.0
    }
}

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a Kubernetes quantity string. Plain and exponent-notation numbers
/// are accepted alongside the decimal and binary SI suffixes.
pub fn parse(s: &str) -> Result<ParsedQuantity, QuantityError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(QuantityError::Invalid(s.to_string()));
    }

    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            // A bare "E" or "e" followed by digits is exponent notation,
            // not the exa suffix; it is handled by the plain parse below.
            if *suffix == "E" && number.ends_with(|c: char| c == '.' || c.is_ascii_digit()) {
                let value: f64 = number
                    .parse()
                    .map_err(|_| QuantityError::Invalid(s.to_string()))?;
                return Ok(ParsedQuantity(value * multiplier));
            }
            if *suffix != "E" {
                let value: f64 = number
                    .parse()
                    .map_err(|_| QuantityError::Invalid(s.to_string()))?;
                return Ok(ParsedQuantity(value * multiplier));
            }
        }
    }

    s.parse::<f64>()
        .map(ParsedQuantity)
        .map_err(|_| QuantityError::Invalid(s.to_string()))
}
