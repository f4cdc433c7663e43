use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::association_rules::Rule;
use crate::error::{MiningError, Result};

/// Metric a rule is filtered (and optionally sorted) by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    AntecedentSupport,
    ConsequentSupport,
    Support,
    Confidence,
    Lift,
    Leverage,
    Conviction,
    ZhangsMetric,
    Jaccard,
    Certainty,
    Kulczynski,
}

pub(crate) const METRIC_NAMES: &[(&str, RuleMetric)] = &[
    ("antecedent_support", RuleMetric::AntecedentSupport),
    ("consequent_support", RuleMetric::ConsequentSupport),
    ("support", RuleMetric::Support),
    ("confidence", RuleMetric::Confidence),
    ("lift", RuleMetric::Lift),
    ("leverage", RuleMetric::Leverage),
    ("conviction", RuleMetric::Conviction),
    ("zhangs_metric", RuleMetric::ZhangsMetric),
    ("jaccard", RuleMetric::Jaccard),
    ("certainty", RuleMetric::Certainty),
    ("kulczynski", RuleMetric::Kulczynski),
];

impl RuleMetric {
    pub fn name(self) -> &'static str {
        METRIC_NAMES
            .iter()
            .find(|(_, m)| *m == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    /// Checks that `threshold` lies in the range the metric can take.
    pub fn validate_threshold(self, threshold: f64) -> Result<()> {
        let in_range = match self {
            RuleMetric::AntecedentSupport
            | RuleMetric::ConsequentSupport
            | RuleMetric::Support
            | RuleMetric::Confidence
            | RuleMetric::Jaccard
            | RuleMetric::Kulczynski => (0.0..=1.0).contains(&threshold),
            RuleMetric::Lift | RuleMetric::Conviction => threshold >= 0.0,
            RuleMetric::ZhangsMetric => (-1.0..=1.0).contains(&threshold),
            RuleMetric::Leverage | RuleMetric::Certainty => threshold.is_finite(),
        };
        if in_range {
            Ok(())
        } else {
            Err(MiningError::InvalidThreshold { name: self.name(), value: threshold })
        }
    }
}

impl fmt::Display for RuleMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleMetric {
    type Err = MiningError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().replace(' ', "_");
        METRIC_NAMES
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, m)| *m)
            .ok_or_else(|| MiningError::invalid_input(format!("unknown metric: '{s}'")))
    }
}

/// Post-generation rule filter. Every bound is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleFilter {
    pub min_support: Option<f64>,
    pub min_confidence: Option<f64>,
    pub min_lift: Option<f64>,
    pub max_antecedents: Option<usize>,
    pub max_consequents: Option<usize>,
}

impl RuleFilter {
    pub fn is_empty(&self) -> bool {
        *self == RuleFilter::default()
    }

    pub fn accepts(&self, rule: &Rule) -> bool {
        self.min_support.map_or(true, |m| rule.support >= m)
            && self.min_confidence.map_or(true, |m| rule.confidence >= m)
            && self.min_lift.map_or(true, |m| rule.lift >= m)
            && self.max_antecedents.map_or(true, |m| rule.antecedent.len() <= m)
            && self.max_consequents.map_or(true, |m| rule.consequent.len() <= m)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(v) = self.min_support {
            RuleMetric::Support.validate_threshold(v)?;
        }
        if let Some(v) = self.min_confidence {
            RuleMetric::Confidence.validate_threshold(v)?;
        }
        if let Some(v) = self.min_lift {
            RuleMetric::Lift.validate_threshold(v)?;
        }
        if self.max_antecedents == Some(0) {
            return Err(MiningError::InvalidThreshold { name: "max_antecedents", value: 0.0 });
        }
        if self.max_consequents == Some(0) {
            return Err(MiningError::InvalidThreshold { name: "max_consequents", value: 0.0 });
        }
        Ok(())
    }
}

/// Parameters of one mining run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiningConfig {
    /// Summed quantity at which an item counts as present in a basket.
    pub basket_threshold: f64,
    pub min_support: f64,
    pub max_len: Option<usize>,
    /// Apriori aborts a level that generates more candidates than this.
    pub max_candidates: Option<usize>,
    pub metric: RuleMetric,
    pub min_threshold: f64,
    pub filter: RuleFilter,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            basket_threshold: 1.0,
            min_support: 0.02,
            max_len: None,
            max_candidates: None,
            metric: RuleMetric::Confidence,
            min_threshold: 0.3,
            filter: RuleFilter::default(),
        }
    }
}

impl MiningConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: MiningConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            MiningError::invalid_input(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        validate_basket_threshold(self.basket_threshold)?;
        validate_min_support(self.min_support)?;
        validate_max_len(self.max_len)?;
        if self.max_candidates == Some(0) {
            return Err(MiningError::InvalidThreshold { name: "max_candidates", value: 0.0 });
        }
        self.metric.validate_threshold(self.min_threshold)?;
        self.filter.validate()
    }
}

pub(crate) fn validate_basket_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(MiningError::invalid_input(format!(
            "basket threshold must be a positive number, got {threshold}"
        )))
    }
}

pub(crate) fn validate_min_support(min_support: f64) -> Result<()> {
    if min_support > 0.0 && min_support <= 1.0 {
        Ok(())
    } else {
        Err(MiningError::InvalidThreshold { name: "min_support", value: min_support })
    }
}

pub(crate) fn validate_max_len(max_len: Option<usize>) -> Result<()> {
    match max_len {
        Some(0) => Err(MiningError::InvalidThreshold { name: "max_len", value: 0.0 }),
        _ => Ok(()),
    }
}
