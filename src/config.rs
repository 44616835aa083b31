//! Planner configuration.
//!
//! Every section has defaults, so a config file only lists what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::OptimizationCriteria;
use crate::osrm::OsrmConfig;

/// Environment variable overriding `osrm.base_url`.
pub const OSRM_URL_ENV: &str = "DISPATCH_OSRM_URL";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub criteria: OptimizationCriteria,
    pub solver: SolverConfig,
    pub service: ServiceTimes,
    pub reoptimization: ReoptimizationConfig,
    pub monitor: MonitorConfig,
    pub osrm: OsrmConfig,
    pub planner: PlannerConfig,
}

impl OptimizerConfig {
    /// Parse a JSON config; missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`OptimizerConfig::load`], reading overrides through `lookup`.
    pub fn load_with(path: impl AsRef<Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`; blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(OSRM_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::info!(%url, "OSRM base URL overridden from environment");
                self.osrm.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.criteria.validate()?;
        self.solver.validate()?;
        self.reoptimization.validate()?;
        if self.planner.candidate_drivers == 0 {
            return Err(invalid("planner.candidate_drivers", "must be at least 1"));
        }
        if !(self.planner.fallback_speed_kmh > 0.0) {
            return Err(invalid("planner.fallback_speed_kmh", "must be positive"));
        }
        if self.service.pickup_secs < 0 || self.service.dropoff_secs < 0 {
            return Err(invalid("service", "service times must not be negative"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum improvement passes for local search.
    pub local_search_iterations: usize,
    /// Largest stop count the exhaustive solver accepts.
    pub max_exact_stops: usize,
    /// Above this stop count `Auto` switches to simulated annealing.
    pub large_route_stops: usize,
    /// Seed for the metaheuristics' random number generator.
    pub seed: u64,
    pub annealing: AnnealingConfig,
    pub genetic: GeneticConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            local_search_iterations: 200,
            max_exact_stops: 8,
            large_route_stops: 16,
            seed: 42,
            annealing: AnnealingConfig::default(),
            genetic: GeneticConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let annealing = &self.annealing;
        if !(annealing.initial_temperature > annealing.min_temperature && annealing.min_temperature > 0.0) {
            return Err(invalid(
                "solver.annealing",
                "initial_temperature must exceed a positive min_temperature",
            ));
        }
        if !(annealing.cooling_rate > 0.0 && annealing.cooling_rate < 1.0) {
            return Err(invalid("solver.annealing.cooling_rate", "must be in (0, 1)"));
        }
        let genetic = &self.genetic;
        if genetic.population_size < 2 {
            return Err(invalid("solver.genetic.population_size", "must be at least 2"));
        }
        if genetic.elite_count >= genetic.population_size {
            return Err(invalid(
                "solver.genetic.elite_count",
                "must be smaller than population_size",
            ));
        }
        if genetic.tournament_size == 0 {
            return Err(invalid("solver.genetic.tournament_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&genetic.mutation_rate) {
            return Err(invalid("solver.genetic.mutation_rate", "must be in [0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Starting temperature, in cost units.
    pub initial_temperature: f64,
    /// Multiplier applied after each temperature step.
    pub cooling_rate: f64,
    pub min_temperature: f64,
    pub moves_per_temperature: usize,
    /// Temperature steps without a new best before stopping.
    pub stall_limit: usize,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 50.0,
            cooling_rate: 0.95,
            min_temperature: 0.01,
            moves_per_temperature: 100,
            stall_limit: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    /// Best individuals copied unchanged into the next generation.
    pub elite_count: usize,
    /// Generations without a new best before stopping.
    pub stall_generations: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 40,
            generations: 150,
            mutation_rate: 0.2,
            tournament_size: 3,
            elite_count: 2,
            stall_generations: 40,
        }
    }
}

/// Dwell time at each stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceTimes {
    pub pickup_secs: i64,
    pub dropoff_secs: i64,
}

impl Default for ServiceTimes {
    fn default() -> Self {
        Self {
            pickup_secs: 120,
            dropoff_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReoptimizationConfig {
    /// Minimum relative cost reduction for a new route to replace the current one.
    pub min_improvement_pct: f64,
    /// Minimum absolute cost reduction, in cost units.
    pub min_improvement_cost: f64,
    /// Non-critical triggers within this many seconds of the last recompute are deferred.
    pub cooldown_secs: i64,
    /// Preparation delays at least this long count as major.
    pub major_delay_secs: i64,
    /// Distance from the planned path that counts as off-route.
    pub off_route_km: f64,
    /// Incident slowdown factor at or above which an incident is major.
    pub major_traffic_factor: f64,
    /// Records kept in the route's history.
    pub history_limit: usize,
}

impl Default for ReoptimizationConfig {
    fn default() -> Self {
        Self {
            min_improvement_pct: 5.0,
            min_improvement_cost: 1.0,
            cooldown_secs: 120,
            major_delay_secs: 300,
            off_route_km: 0.5,
            major_traffic_factor: 1.3,
            history_limit: 50,
        }
    }
}

impl ReoptimizationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_improvement_pct < 0.0 || self.min_improvement_cost < 0.0 {
            return Err(invalid(
                "reoptimization",
                "improvement thresholds must not be negative",
            ));
        }
        if self.cooldown_secs < 0 {
            return Err(invalid("reoptimization.cooldown_secs", "must not be negative"));
        }
        if !(self.off_route_km > 0.0) {
            return Err(invalid("reoptimization.off_route_km", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub max_runtime_ms: f64,
    /// Allowed gap to the best algorithm in a comparison, in percent.
    pub max_gap_pct: f64,
    pub max_reoptimizations_per_hour: usize,
    /// Most recent alerts kept in memory; sinks still receive every alert.
    pub alert_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_runtime_ms: 500.0,
            max_gap_pct: 15.0,
            max_reoptimizations_per_hour: 6,
            alert_buffer: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Nearest drivers considered per batch.
    pub candidate_drivers: usize,
    /// Speed used by the haversine fallback matrix.
    pub fallback_speed_kmh: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            candidate_drivers: 3,
            fallback_speed_kmh: crate::haversine::DEFAULT_SPEED_KMH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = OptimizerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OptimizerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = OptimizerConfig::from_json_str(
            r#"{
                "criteria": { "max_orders_per_batch": 4 },
                "solver": { "annealing": { "cooling_rate": 0.9 } },
                "reoptimization": { "cooldown_secs": 30 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.criteria.max_orders_per_batch, 4);
        assert_eq!(config.solver.annealing.cooling_rate, 0.9);
        assert_eq!(config.solver.annealing.moves_per_temperature, 100);
        assert_eq!(config.reoptimization.cooldown_secs, 30);
        assert_eq!(config.osrm, OsrmConfig::default());
    }

    #[test]
    fn test_invalid_cooling_rate() {
        let err = OptimizerConfig::from_json_str(r#"{"solver":{"annealing":{"cooling_rate":1.5}}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "solver.annealing.cooling_rate",
                ..
            }
        ));
    }

    #[test]
    fn test_elite_must_be_smaller_than_population() {
        let err = OptimizerConfig::from_json_str(
            r#"{"solver":{"genetic":{"population_size":4,"elite_count":4}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("elite_count"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            OptimizerConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }

    fn write_config(name: &str, json: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dispatch-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_load_file() {
        let path = write_config(
            "load",
            r#"{"criteria":{"max_orders_per_batch":2},"osrm":{"base_url":"http://osrm.local:5000"}}"#,
        );
        let config = OptimizerConfig::load_with(&path, |_| None).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.criteria.max_orders_per_batch, 2);
        assert_eq!(config.osrm.base_url, "http://osrm.local:5000");
    }

    #[test]
    fn test_osrm_url_env_override() {
        let path = write_config("env", r#"{"osrm":{"base_url":"http://osrm.local:5000"}}"#);
        let lookup = |key: &str| (key == OSRM_URL_ENV).then(|| "http://osrm.prod:5000".to_string());
        let config = OptimizerConfig::load_with(&path, lookup).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.osrm.base_url, "http://osrm.prod:5000");

        let mut config = OptimizerConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.osrm, OsrmConfig::default());
    }

    #[test]
    fn test_load_validates() {
        let path = write_config("invalid", r#"{"planner":{"candidate_drivers":0}}"#);
        let err = OptimizerConfig::load_with(&path, |_| None).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Invalid { field: "planner.candidate_drivers", .. }));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            OptimizerConfig::load("/nonexistent/dispatch.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
