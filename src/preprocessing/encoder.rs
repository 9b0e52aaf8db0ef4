//! Categorical encoding

use crate::error::{Result, WizardError};
use crate::table::{column_kind, series, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Encoding chosen for a categorical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMethod {
    /// Keep the column as text
    #[default]
    None,
    /// Replace values by their index in the sorted distinct values
    Label,
    /// One boolean indicator column per distinct value
    #[serde(alias = "onehot")]
    OneHot,
}

impl fmt::Display for EncodingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMethod::None => write!(f, "none"),
            EncodingMethod::Label => write!(f, "label"),
            EncodingMethod::OneHot => write!(f, "one_hot"),
        }
    }
}

/// Categorical encoder for a single column.
///
/// Categories are the sorted distinct non-null values seen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoder {
    method: EncodingMethod,
    column: Option<String>,
    categories: Vec<String>,
}

impl Encoder {
    pub fn new(method: EncodingMethod) -> Self {
        Self {
            method,
            column: None,
            categories: Vec::new(),
        }
    }

    /// Learn the categories of `column`
    pub fn fit(&mut self, df: &DataFrame, column: &str) -> Result<&mut Self> {
        let s = series(df, column)?;
        if column_kind(s.dtype()) != ColumnKind::Categorical {
            return Err(WizardError::NonCategoricalColumn(column.to_string()));
        }
        let casted = s.cast(&DataType::String)?;
        let distinct: BTreeSet<&str> = casted.str()?.into_iter().flatten().collect();
        self.categories = distinct.into_iter().map(str::to_string).collect();
        self.column = Some(column.to_string());
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let column = self.column.as_deref().ok_or(WizardError::ModelNotFitted)?;
        match self.method {
            EncodingMethod::None => Ok(df.clone()),
            EncodingMethod::Label => self.transform_label(df, column),
            EncodingMethod::OneHot => self.transform_onehot(df, column),
        }
    }

    pub fn fit_transform(&mut self, df: &DataFrame, column: &str) -> Result<DataFrame> {
        self.fit(df, column)?;
        self.transform(df)
    }

    /// Sorted categories learned by `fit`
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Names of the indicator columns one-hot encoding produces
    pub fn indicator_names(&self) -> Vec<String> {
        let column = self.column.as_deref().unwrap_or_default();
        self.categories
            .iter()
            .map(|cat| format!("{}_{}", column, cat))
            .collect()
    }

    fn text_values(df: &DataFrame, column: &str) -> Result<StringChunked> {
        let casted = series(df, column)?.cast(&DataType::String)?;
        Ok(casted.str()?.clone())
    }

    fn transform_label(&self, df: &DataFrame, column: &str) -> Result<DataFrame> {
        let codes: BTreeMap<&str, i64> = self
            .categories
            .iter()
            .enumerate()
            .map(|(i, cat)| (cat.as_str(), i as i64))
            .collect();

        let values = Self::text_values(df, column)?;
        let encoded: Int64Chunked = values
            .into_iter()
            .map(|opt| opt.and_then(|v| codes.get(v).copied()))
            .collect();

        let mut result = df.clone();
        result.with_column(encoded.with_name(column.into()).into_series())?;
        Ok(result)
    }

    fn transform_onehot(&self, df: &DataFrame, column: &str) -> Result<DataFrame> {
        let values = Self::text_values(df, column)?;
        let mut result = df.drop(column)?;

        for (cat, name) in self.categories.iter().zip(self.indicator_names()) {
            if result.column(&name).is_ok() {
                return Err(WizardError::ColumnCollision(name));
            }
            let indicator: BooleanChunked = values
                .into_iter()
                .map(|opt| Some(opt == Some(cat.as_str())))
                .collect();
            result.with_column(indicator.with_name(name.as_str().into()).into_series())?;
        }
        Ok(result)
    }
}
