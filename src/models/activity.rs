use serde::{Deserialize, Serialize};

/// A task node of the compiled dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u32,
    pub name: String,
    pub duration: u32,
    /// Total slack in days; `None` until the graph has been compiled.
    pub total_slack: Option<i32>,
    pub dependencies: Vec<u32>,
    /// Zero-duration placeholder inserted for graph structure only.
    pub is_dummy: bool,
}

impl Activity {
    pub fn new(id: u32, name: impl Into<String>, duration: u32) -> Self {
        Self {
            id,
            name: name.into(),
            duration,
            total_slack: None,
            dependencies: Vec::new(),
            is_dummy: false,
        }
    }

    pub fn dummy(id: u32) -> Self {
        Self {
            is_dummy: true,
            ..Self::new(id, format!("dummy-{id}"), 0)
        }
    }

    pub fn with_slack(mut self, total_slack: i32) -> Self {
        self.total_slack = Some(total_slack);
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<u32>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// One row of the severity table: activities whose slack is below
/// `slack_limit` get these weights. `None` is an unbounded limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySeverity {
    pub slack_limit: Option<i32>,
    pub criticality_weight: f64,
    pub fibonacci_weight: f64,
}

impl ActivitySeverity {
    pub fn new(slack_limit: Option<i32>, criticality_weight: f64, fibonacci_weight: f64) -> Self {
        Self {
            slack_limit,
            criticality_weight,
            fibonacci_weight,
        }
    }

    pub fn covers(&self, slack: i32) -> bool {
        self.slack_limit.map_or(true, |limit| slack < limit)
    }
}

/// Default severity table, ordered by ascending slack limit.
pub fn default_activity_severities() -> Vec<ActivitySeverity> {
    vec![
        ActivitySeverity::new(Some(1), 4.0, 8.0),
        ActivitySeverity::new(Some(10), 3.0, 5.0),
        ActivitySeverity::new(Some(20), 2.0, 3.0),
        ActivitySeverity::new(None, 1.0, 1.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_severity_covers_any_slack() {
        let severity = ActivitySeverity::new(None, 1.0, 1.0);
        assert!(severity.covers(i32::MAX - 1));
        assert!(severity.covers(-5));
    }

    #[test]
    fn bounded_severity_excludes_its_limit() {
        let severity = ActivitySeverity::new(Some(10), 3.0, 5.0);
        assert!(severity.covers(9));
        assert!(!severity.covers(10));
    }

    #[test]
    fn dummy_activities_have_no_duration() {
        let dummy = Activity::dummy(7);
        assert!(dummy.is_dummy);
        assert_eq!(dummy.duration, 0);
    }
}
