//! Outcome tallies.

use std::{collections::BTreeMap, fmt};

use mhprobe::{Outcome, ProbeValue};

#[derive(Debug, Default)]
pub struct Summary {
    counts: BTreeMap<String, usize>,
    values: Vec<f64>,
    identifiers: Vec<i64>,
}

impl Summary {
    pub fn record(&mut self, outcome: Option<&Outcome>) {
        let key = match outcome {
            None => "dropped".to_string(),
            Some(Outcome::Error { error, .. }) => error.to_string(),
            Some(Outcome::Refused) => "REFUSED".to_string(),
            Some(Outcome::Value(value)) => {
                self.values.extend(numeric(value));
                if let ProbeValue::Identifier { identifier, .. } = value {
                    self.identifiers.push(*identifier);
                }
                "VALUE".to_string()
            },
        };
        *self.counts.entry(key).or_default() += 1;
    }

    /// Identifiers of every endpoint that answered an IDENTIFIER probe.
    pub fn identifiers(&self) -> &[i64] {
        &self.identifiers
    }
}

fn numeric(value: &ProbeValue) -> Vec<f64> {
    match value {
        ProbeValue::Bandwidth(v) | ProbeValue::Location(v) | ProbeValue::StoreSize(v) => {
            vec![f64::from(*v)]
        },
        ProbeValue::Uptime(v) => vec![f64::from(*v)],
        ProbeValue::Build(build) => vec![f64::from(*build)],
        ProbeValue::Identifier { uptime_percent, .. } => vec![f64::from(*uptime_percent)],
        ProbeValue::LinkLengths(lengths) => lengths.iter().map(|l| f64::from(*l)).collect(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Outcomes:")?;
        for (key, count) in &self.counts {
            writeln!(f, "  {key}: {count}")?;
        }

        if self.values.is_empty() {
            return Ok(());
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        writeln!(f, "Values:")?;
        writeln!(f, "  samples: {}", self.values.len())?;
        writeln!(f, "  mean: {mean:.4}")?;
        writeln!(f, "  min: {min:.4}")?;
        write!(f, "  max: {max:.4}")
    }
}
