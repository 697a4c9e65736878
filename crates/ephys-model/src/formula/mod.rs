// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Distribution formulas.

A distribution is written as a template with brace slots, for example
`({A} + {B} * math.exp({distance} * {C})) * {value}`. It moves through
three stages:

- [`DistributionTemplate`]: parsed, every slot checked against the declared
  coefficients
- [`PartialFormula`]: value and coefficients substituted, `{distance}` still
  open
- [`NumericFormula`]: fully substituted text, ready to evaluate

`{{` and `}}` stand for literal braces.
*/

pub mod expr;

use std::fmt;

use crate::error::{is_valid_identifier, ModelError, ModelResult};
use crate::numeric::{format_general, Numeric};

/// Slot bound per segment
pub const DISTANCE_SLOT: &str = "distance";
/// Slot bound to the parameter value
pub const VALUE_SLOT: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePiece {
    Text(String),
    Slot(String),
}

/// Parsed distribution template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTemplate {
    source: String,
    pieces: Vec<TemplatePiece>,
}

impl DistributionTemplate {
    /// Parse `source`, accepting any identifier as a slot
    pub fn parse(source: &str) -> ModelResult<Self> {
        let malformed = |reason: String| ModelError::Template {
            template: source.to_string(),
            reason,
        };

        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut slot = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => slot.push(c),
                            None => return Err(malformed(format!("unterminated slot '{{{}'", slot))),
                        }
                    }
                    if !is_valid_identifier(&slot) {
                        return Err(malformed(format!("invalid slot name '{}'", slot)));
                    }
                    if !text.is_empty() {
                        pieces.push(TemplatePiece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(TemplatePiece::Slot(slot));
                }
                '}' => return Err(malformed("unmatched '}'".to_string())),
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            pieces.push(TemplatePiece::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    /// Parse `source` and require every slot other than `distance` and
    /// `value` to be one of `coefficients`
    pub fn with_coefficients(source: &str, coefficients: &[String]) -> ModelResult<Self> {
        let template = Self::parse(source)?;
        for slot in template.slots() {
            if slot != DISTANCE_SLOT && slot != VALUE_SLOT && !coefficients.iter().any(|c| c == slot) {
                return Err(ModelError::UnknownCoefficient(slot.to_string()));
            }
        }
        Ok(template)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Slot names in order of appearance (repeats included)
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.pieces.iter().filter_map(|piece| match piece {
            TemplatePiece::Slot(name) => Some(name.as_str()),
            TemplatePiece::Text(_) => None,
        })
    }

    pub fn depends_on_distance(&self) -> bool {
        self.slots().any(|slot| slot == DISTANCE_SLOT)
    }

    /// Substitute the value (`%.17g`) and every coefficient (default string
    /// form), leaving `{distance}` open.
    ///
    /// `coefficient` returns `Ok(None)` for a declared coefficient without a
    /// value, which fails with [`ModelError::MissingCoefficient`].
    pub fn bind<F>(&self, value: Numeric, mut coefficient: F) -> ModelResult<PartialFormula>
    where
        F: FnMut(&str) -> ModelResult<Option<Numeric>>,
    {
        let mut partial = PartialFormula::default();
        for piece in &self.pieces {
            match piece {
                TemplatePiece::Text(text) => partial.push_text(text),
                TemplatePiece::Slot(slot) if slot == DISTANCE_SLOT => {
                    partial.pieces.push(PartialPiece::Distance)
                }
                TemplatePiece::Slot(slot) if slot == VALUE_SLOT => {
                    partial.push_text(&value.to_general())
                }
                TemplatePiece::Slot(slot) => match coefficient(slot)? {
                    Some(coefficient) => partial.push_text(&coefficient.to_string()),
                    None => return Err(ModelError::MissingCoefficient(slot.clone())),
                },
            }
        }
        Ok(partial)
    }
}

impl fmt::Display for DistributionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PartialPiece {
    Text(String),
    Distance,
}

/// Formula with value and coefficients bound; only the distance is open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFormula {
    pieces: Vec<PartialPiece>,
}

impl PartialFormula {
    fn push_text(&mut self, text: &str) {
        if let Some(PartialPiece::Text(last)) = self.pieces.last_mut() {
            last.push_str(text);
        } else {
            self.pieces.push(PartialPiece::Text(text.to_string()));
        }
    }

    pub fn depends_on_distance(&self) -> bool {
        self.pieces.contains(&PartialPiece::Distance)
    }

    /// Bind the distance (`%.17g`)
    pub fn bind_distance(&self, distance: f64) -> NumericFormula {
        NumericFormula(self.fill(&format_general(distance, 17)))
    }

    /// Text with the distance replaced by `placeholder`
    pub fn with_placeholder(&self, placeholder: &str) -> String {
        self.fill(placeholder)
    }

    /// Form emitted into generated templates: distance left as
    /// `placeholder` for the per-segment `sprint`, `math.` prefixes removed
    pub fn to_lazy(&self, placeholder: &str) -> String {
        self.fill(placeholder).replace("math.", "")
    }

    fn fill(&self, distance: &str) -> String {
        self.pieces
            .iter()
            .map(|piece| match piece {
                PartialPiece::Text(text) => text.as_str(),
                PartialPiece::Distance => distance,
            })
            .collect()
    }
}

impl fmt::Display for PartialFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fill("{distance}"))
    }
}

/// Fully bound formula text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericFormula(String);

impl NumericFormula {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn evaluate(&self) -> ModelResult<f64> {
        expr::evaluate(&self.0).map_err(|reason| ModelError::Formula {
            formula: self.0.clone(),
            reason,
        })
    }
}

impl fmt::Display for NumericFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
