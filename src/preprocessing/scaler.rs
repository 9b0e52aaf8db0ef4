//! Feature scaling

use crate::error::{Result, WizardError};
use crate::table::{column_kind, series, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerType {
    /// z-score: (x - mean) / std, population std
    Standard,
    /// (x - min) / (max - min)
    #[serde(alias = "minmax")]
    MinMax,
    /// (x - median) / IQR
    Robust,
}

impl fmt::Display for ScalerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerType::Standard => write!(f, "standard"),
            ScalerType::MinMax => write!(f, "min_max"),
            ScalerType::Robust => write!(f, "robust"),
        }
    }
}

/// Parameters for one fitted column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    /// mean, min, or median
    pub center: f64,
    /// std, range, or IQR; never zero
    pub scale: f64,
}

/// Feature scaler over a selected set of numeric columns.
///
/// Parameters are computed per column from that column's non-null values and
/// never outlive one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    params: Vec<(String, ScalerParams)>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            params: Vec::new(),
            is_fitted: false,
        }
    }

    /// Fit the scaler to `columns`; every one must be numeric and hold a value.
    pub fn fit<S: AsRef<str>>(&mut self, df: &DataFrame, columns: &[S]) -> Result<&mut Self> {
        self.params.clear();
        for name in columns {
            let name = name.as_ref();
            let s = series(df, name)?;
            if column_kind(s.dtype()) != ColumnKind::Numeric {
                return Err(WizardError::NonNumericColumn(name.to_string()));
            }
            let params = self.compute_params(s)?;
            self.params.push((name.to_string(), params));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Replace every fitted column by its scaled Float64 version.
    /// Nulls stay null.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(WizardError::ModelNotFitted);
        }

        let replacements = self
            .params
            .iter()
            .map(|(name, params)| scale_series(series(df, name)?, params))
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result.with_column(scaled)?;
        }
        Ok(result)
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, df: &DataFrame, columns: &[S]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Fitted parameters in selection order
    pub fn params(&self) -> &[(String, ScalerParams)] {
        &self.params
    }

    fn compute_params(&self, s: &Series) -> Result<ScalerParams> {
        let casted = s.cast(&DataType::Float64)?;
        let ca = casted.f64()?;
        if ca.len() == ca.null_count() {
            return Err(WizardError::DegenerateStatistic {
                column: s.name().to_string(),
                statistic: format!("{} scaling", self.scaler_type),
            });
        }

        let (center, scale) = match self.scaler_type {
            ScalerType::Standard => (ca.mean().unwrap_or(0.0), ca.std(0).unwrap_or(0.0)),
            ScalerType::MinMax => {
                let min = ca.min().unwrap_or(0.0);
                let max = ca.max().unwrap_or(0.0);
                (min, max - min)
            }
            ScalerType::Robust => {
                let median = ca.median().unwrap_or(0.0);
                let q1 = ca.quantile(0.25, QuantileMethod::Linear)?.unwrap_or(0.0);
                let q3 = ca.quantile(0.75, QuantileMethod::Linear)?.unwrap_or(0.0);
                (median, q3 - q1)
            }
        };

        Ok(ScalerParams {
            center,
            scale: if scale == 0.0 || !scale.is_finite() { 1.0 } else { scale },
        })
    }
}

fn scale_series(s: &Series, params: &ScalerParams) -> Result<Series> {
    let casted = s.cast(&DataType::Float64)?;
    let scaled: Float64Chunked = casted
        .f64()?
        .into_iter()
        .map(|opt| opt.map(|v| (v - params.center) / params.scale))
        .collect();
    Ok(scaled.with_name(s.name().clone()).into_series())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name).unwrap().f64().unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn test_standard_scaler_population_variance() {
        let df = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let result = Scaler::new(ScalerType::Standard).fit_transform(&df, &["a"]).unwrap();

        let v = values(&result, "a");
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / v.len() as f64;
        assert!(mean.abs() < 1e-10);
        assert!((var - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_minmax_scaler() {
        let df = df!("a" => &[Some(1i64), None, Some(3), Some(5)]).unwrap();
        let result = Scaler::new(ScalerType::MinMax).fit_transform(&df, &["a"]).unwrap();

        let col = result.column("a").unwrap();
        assert_eq!(col.dtype(), &DataType::Float64);
        assert_eq!(col.null_count(), 1);
        assert_eq!(values(&result, "a"), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_robust_scaler() {
        let df = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let mut scaler = Scaler::new(ScalerType::Robust);
        let result = scaler.fit_transform(&df, &["a"]).unwrap();
        assert_eq!(scaler.params()[0].1, ScalerParams { center: 3.0, scale: 2.0 });
        assert_eq!(values(&result, "a"), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let df = df!("a" => &[4.0, 4.0, 4.0]).unwrap();
        for kind in [ScalerType::Standard, ScalerType::MinMax, ScalerType::Robust] {
            let result = Scaler::new(kind).fit_transform(&df, &["a"]).unwrap();
            assert_eq!(values(&result, "a"), vec![0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_rejects_text_and_empty_columns() {
        let df = df!("t" => &["x", "y"], "e" => &[None::<f64>, None]).unwrap();
        let err = Scaler::new(ScalerType::Standard).fit(&df, &["t"]).unwrap_err();
        assert!(matches!(err, WizardError::NonNumericColumn(_)));
        let err = Scaler::new(ScalerType::Standard).fit(&df, &["e"]).unwrap_err();
        assert!(matches!(err, WizardError::DegenerateStatistic { .. }));
    }

    #[test]
    fn test_transform_before_fit() {
        let df = df!("a" => &[1.0]).unwrap();
        assert!(matches!(
            Scaler::new(ScalerType::Standard).transform(&df),
            Err(WizardError::ModelNotFitted)
        ));
    }
}
