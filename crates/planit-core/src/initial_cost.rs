//! Initial link segment cost registration.
//!
//! Initial costs are collected locally and registered on the project right
//! before the assignments run. A project uses either one default cost file or
//! one file per time period; mixing the two is rejected when configured.

use crate::error::{PlanitError, Result};
use crate::wrappers::{InitialLinkSegmentCost, PlanItSimpleProject};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
enum CostPlan {
    #[default]
    Unset,
    Default(PathBuf),
    PerTimePeriod(BTreeMap<String, PathBuf>),
}

#[derive(Debug, Default)]
struct CostState {
    plan: CostPlan,
    registered: bool,
}

/// Initial cost configuration of one project.
#[derive(Debug, Default)]
pub struct InitialCosts {
    state: Mutex<CostState>,
}

impl InitialCosts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CostState>> {
        self.state
            .lock()
            .map_err(|_| PlanitError::Other("initial cost state poisoned".to_string()))
    }

    /// Use `path` for every time period. Replaces an earlier default.
    pub fn set_default(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let mut state = self.lock()?;
        ensure_unregistered(&state)?;
        match &state.plan {
            CostPlan::PerTimePeriod(_) => Err(mixed_plans()),
            _ => {
                debug!("Default initial costs: {}", path.display());
                state.plan = CostPlan::Default(path);
                Ok(())
            }
        }
    }

    /// Use `path` for the time period `time_period_xml_id`.
    pub fn set_for_time_period(
        &self,
        path: impl Into<PathBuf>,
        time_period_xml_id: impl Into<String>,
    ) -> Result<()> {
        let path = path.into();
        let xml_id = time_period_xml_id.into();
        let mut state = self.lock()?;
        ensure_unregistered(&state)?;
        if state.plan == CostPlan::Unset {
            state.plan = CostPlan::PerTimePeriod(BTreeMap::new());
        }
        match &mut state.plan {
            CostPlan::PerTimePeriod(map) => {
                debug!("Initial costs for time period {}: {}", xml_id, path.display());
                map.insert(xml_id, path);
                Ok(())
            }
            _ => Err(mixed_plans()),
        }
    }

    /// Pick the default cost file from `locations` by zero-based `position`.
    pub fn register_default<P: AsRef<Path>>(&self, locations: &[P], position: usize) -> Result<()> {
        let chosen = locations.get(position).ok_or_else(|| PlanitError::Validation {
            field: "position".to_string(),
            message: format!(
                "{} is out of range for {} initial cost locations",
                position,
                locations.len()
            ),
        })?;
        self.set_default(chosen.as_ref())
    }

    /// Register one cost file per time period xml id.
    pub fn register_per_time_period<K, P>(&self, locations: impl IntoIterator<Item = (K, P)>) -> Result<()>
    where
        K: Into<String>,
        P: Into<PathBuf>,
    {
        for (xml_id, path) in locations {
            self.set_for_time_period(path, xml_id)?;
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.lock()
            .map(|state| state.plan != CostPlan::Unset)
            .unwrap_or(false)
    }

    /// Register the configured costs on `project`.
    ///
    /// Runs once; later calls register nothing and return an empty list.
    pub async fn apply(&self, project: &PlanItSimpleProject) -> Result<Vec<InitialLinkSegmentCost>> {
        let plan = {
            let mut state = self.lock()?;
            if state.registered {
                return Ok(Vec::new());
            }
            state.registered = true;
            state.plan.clone()
        };

        let registered = match plan {
            CostPlan::Unset => Vec::new(),
            CostPlan::Default(path) => {
                vec![project.register_initial_link_segment_cost(&path).await?]
            }
            CostPlan::PerTimePeriod(map) => {
                let mut costs = Vec::with_capacity(map.len());
                for (xml_id, path) in &map {
                    costs.push(
                        project
                            .register_initial_link_segment_cost_for_time_period(path, xml_id)
                            .await?,
                    );
                }
                costs
            }
        };
        if !registered.is_empty() {
            info!("Registered {} initial link segment cost file(s)", registered.len());
        }
        Ok(registered)
    }
}

fn ensure_unregistered(state: &CostState) -> Result<()> {
    if state.registered {
        return Err(PlanitError::Config {
            message: "initial costs were already registered on the project".to_string(),
        });
    }
    Ok(())
}

fn mixed_plans() -> PlanitError {
    PlanitError::Config {
        message: "initial costs are either a default file or one file per time period, not both"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_then_per_period_is_rejected() {
        let costs = InitialCosts::new();
        costs.set_default("initial_link_segment_costs.csv").unwrap();

        let err = costs.set_for_time_period("tp1.csv", "0").unwrap_err();
        assert!(matches!(err, PlanitError::Config { .. }));
    }

    #[test]
    fn test_per_period_then_default_is_rejected() {
        let costs = InitialCosts::new();
        costs
            .register_per_time_period([("0", "tp1.csv"), ("1", "tp2.csv")])
            .unwrap();

        let err = costs.set_default("all.csv").unwrap_err();
        assert!(matches!(err, PlanitError::Config { .. }));
    }

    #[test]
    fn test_register_default_picks_position() {
        let costs = InitialCosts::new();
        costs.register_default(&["first.csv", "second.csv"], 1).unwrap();

        let state = costs.lock().unwrap();
        assert_eq!(state.plan, CostPlan::Default(PathBuf::from("second.csv")));
    }

    #[test]
    fn test_register_default_out_of_range() {
        let costs = InitialCosts::new();
        let err = costs.register_default(&["first.csv"], 2).unwrap_err();

        assert!(matches!(err, PlanitError::Validation { .. }));
        assert!(!costs.is_configured());
    }

    #[test]
    fn test_same_time_period_replaces_location() {
        let costs = InitialCosts::new();
        costs.set_for_time_period("a.csv", "0").unwrap();
        costs.set_for_time_period("b.csv", "0").unwrap();

        let state = costs.lock().unwrap();
        match &state.plan {
            CostPlan::PerTimePeriod(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map["0"], PathBuf::from("b.csv"));
            }
            other => panic!("Expected per time period plan, got: {:?}", other),
        }
    }
}
