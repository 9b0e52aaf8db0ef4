//! Preprocessing selections

use super::{EncodingMethod, MissingStrategy, ScalerType};
use crate::error::{Result, WizardError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Missing-value strategy chosen for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSelection {
    pub column: String,
    pub strategy: MissingStrategy,
}

/// Scaling method and the numeric columns it is fitted over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingSelection {
    pub method: ScalerType,
    pub columns: Vec<String>,
}

/// Encoding chosen for one categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingSelection {
    pub column: String,
    pub method: EncodingMethod,
}

/// Everything the user picked on the preprocessing surface.
///
/// Selection order carries no meaning: stages run in their fixed order and
/// per-column selections follow the table's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePlan {
    #[serde(default)]
    pub missing: Vec<MissingSelection>,

    #[serde(default)]
    pub scaling: Option<ScalingSelection>,

    #[serde(default)]
    pub encoding: Vec<EncodingSelection>,

    #[serde(default)]
    pub drop_duplicates: bool,
}

impl PipelinePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to choose a missing-value strategy for a column
    pub fn with_missing(mut self, column: impl Into<String>, strategy: MissingStrategy) -> Self {
        self.missing.push(MissingSelection {
            column: column.into(),
            strategy,
        });
        self
    }

    /// Builder method to scale a set of columns
    pub fn with_scaling<S: Into<String>>(mut self, method: ScalerType, columns: impl IntoIterator<Item = S>) -> Self {
        self.scaling = Some(ScalingSelection {
            method,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Builder method to encode a column
    pub fn with_encoding(mut self, column: impl Into<String>, method: EncodingMethod) -> Self {
        self.encoding.push(EncodingSelection {
            column: column.into(),
            method,
        });
        self
    }

    pub fn with_drop_duplicates(mut self, enabled: bool) -> Self {
        self.drop_duplicates = enabled;
        self
    }

    /// Reject plans that pick two options for the same column
    pub fn validate(&self) -> Result<()> {
        fn unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name) {
                    return Err(WizardError::InvalidInput(format!(
                        "column '{}' has more than one {} selection",
                        name, what
                    )));
                }
            }
            Ok(())
        }

        unique(self.missing.iter().map(|s| s.column.as_str()), "missing-value")?;
        unique(self.encoding.iter().map(|s| s.column.as_str()), "encoding")?;
        if let Some(scaling) = &self.scaling {
            unique(scaling.columns.iter().map(String::as_str), "scaling")?;
        }
        Ok(())
    }

    /// Whether the plan changes nothing
    pub fn is_empty(&self) -> bool {
        self.missing.iter().all(|s| s.strategy == MissingStrategy::None)
            && self.scaling.as_ref().map_or(true, |s| s.columns.is_empty())
            && self.encoding.iter().all(|s| s.method == EncodingMethod::None)
            && !self.drop_duplicates
    }
}
