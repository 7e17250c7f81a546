use crate::models::activity::{default_activity_severities, Activity, ActivitySeverity};
use crate::models::metrics::RiskMetrics;

/// Turns a list of (non-dummy) activities plus a severity table into the
/// seven risk metrics.
pub trait ProjectMetricsService: Send + Sync {
    fn compute(&self, activities: &[Activity], severities: Option<&[ActivitySeverity]>) -> RiskMetrics;
}

/// Slack-based risk indices. All values are in `0.0..=1.0`; higher is riskier.
#[derive(Debug, Default, Clone, Copy)]
pub struct RiskCalculator;

impl ProjectMetricsService for RiskCalculator {
    fn compute(&self, activities: &[Activity], severities: Option<&[ActivitySeverity]>) -> RiskMetrics {
        if activities.is_empty() {
            return RiskMetrics::default();
        }

        let table = severity_table(severities);
        let slacks: Vec<f64> = activities
            .iter()
            .map(|a| a.total_slack.unwrap_or(0).max(0) as f64)
            .collect();
        let (criticality_weights, fibonacci_weights): (Vec<f64>, Vec<f64>) = activities
            .iter()
            .map(|a| {
                let severity = lookup_severity(&table, a.total_slack.unwrap_or(0));
                (severity.criticality_weight, severity.fibonacci_weight)
            })
            .unzip();

        let max_criticality = table.iter().map(|s| s.criticality_weight).fold(0.0, f64::max);
        let max_fibonacci = table.iter().map(|s| s.fibonacci_weight).fold(0.0, f64::max);

        RiskMetrics {
            criticality: weighted_risk(&criticality_weights, max_criticality),
            fibonacci: weighted_risk(&fibonacci_weights, max_fibonacci),
            activity: activity_risk(&slacks),
            activity_std_dev_corrected: activity_risk_std_dev_corrected(&slacks),
            geometric_criticality: ratio(geometric_mean(&criticality_weights), max_criticality),
            geometric_fibonacci: ratio(geometric_mean(&fibonacci_weights), max_fibonacci),
            geometric_activity: geometric_activity_risk(&slacks),
        }
    }
}

/// Sorted copy of the configured table, falling back to the defaults when
/// nothing usable is configured.
fn severity_table(severities: Option<&[ActivitySeverity]>) -> Vec<ActivitySeverity> {
    let mut table = match severities {
        Some(s) if !s.is_empty() => s.to_vec(),
        _ => default_activity_severities(),
    };
    // Unbounded limits sort last.
    table.sort_by_key(|s| s.slack_limit.unwrap_or(i32::MAX));
    table
}

fn lookup_severity(table: &[ActivitySeverity], slack: i32) -> &ActivitySeverity {
    table
        .iter()
        .find(|s| s.covers(slack))
        .unwrap_or_else(|| &table[table.len() - 1])
}

fn weighted_risk(weights: &[f64], max_weight: f64) -> f64 {
    let sum: f64 = weights.iter().sum();
    ratio(sum, weights.len() as f64 * max_weight)
}

fn activity_risk(slacks: &[f64]) -> f64 {
    let max_slack = slacks.iter().copied().fold(0.0, f64::max);
    if max_slack <= 0.0 {
        return 1.0;
    }
    let sum: f64 = slacks.iter().sum();
    1.0 - sum / (slacks.len() as f64 * max_slack)
}

fn activity_risk_std_dev_corrected(slacks: &[f64]) -> f64 {
    let n = slacks.len() as f64;
    let mean = slacks.iter().sum::<f64>() / n;
    let variance = slacks.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let threshold = mean + variance.sqrt();
    if threshold <= 0.0 {
        return 1.0;
    }
    let capped: f64 = slacks.iter().map(|s| s.min(threshold)).sum();
    1.0 - capped / (n * threshold)
}

fn geometric_activity_risk(slacks: &[f64]) -> f64 {
    let max_slack = slacks.iter().copied().fold(0.0, f64::max);
    if max_slack <= 0.0 {
        return 1.0;
    }
    let shifted: Vec<f64> = slacks.iter().map(|s| s + 1.0).collect();
    1.0 - (geometric_mean(&shifted) - 1.0) / max_slack
}

/// Computed in log space; any zero collapses the mean to zero.
fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| *v <= 0.0) {
        return 0.0;
    }
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}
