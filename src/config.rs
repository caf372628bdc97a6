//! Process configuration from command-line flags and environment variables.
//!
//! | Flag | Variable | Default | Meaning |
//! |---|---|---|---|
//! | `--addr` | `ROUTE_OPTIMIZER_ADDR` | `0.0.0.0:7860` | HTTP listen address |
//! | `--time-limit-secs` | `ROUTE_SOLVER_TIME_LIMIT_SECS` | `30` | time budget per batch, `0` for none |
//! | `--step-limit` | `ROUTE_SOLVER_STEP_LIMIT` | unset | step budget per batch |
//! | `--plateau` | `ROUTE_SOLVER_PLATEAU` | `3` | non-improving steps past the last best |
//! | `--daemon` | `ROUTE_SOLVER_DAEMON` | `true` | idle instead of exiting when done |
//!
//! A flag wins over its variable.

use std::net::SocketAddr;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::local_search::DEFAULT_PLATEAU_TOLERANCE;
use crate::solver::{SolverConfig, DEFAULT_TIME_LIMIT_SECS};

pub const ADDR_VAR: &str = "ROUTE_OPTIMIZER_ADDR";
pub const TIME_LIMIT_VAR: &str = "ROUTE_SOLVER_TIME_LIMIT_SECS";
pub const STEP_LIMIT_VAR: &str = "ROUTE_SOLVER_STEP_LIMIT";
pub const PLATEAU_VAR: &str = "ROUTE_SOLVER_PLATEAU";
pub const DAEMON_VAR: &str = "ROUTE_SOLVER_DAEMON";

const DEFAULT_ADDR: &str = "0.0.0.0:7860";

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "route-optimizer", version, about = "Live vehicle routing over HTTP")]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    #[arg(long, env = ADDR_VAR, value_name = "addr", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Solving time per fact-change batch in seconds; 0 disables the limit.
    #[arg(long, env = TIME_LIMIT_VAR, value_name = "secs", default_value_t = DEFAULT_TIME_LIMIT_SECS)]
    pub time_limit_secs: u64,

    /// Steps per fact-change batch.
    #[arg(long, env = STEP_LIMIT_VAR, value_name = "steps")]
    pub step_limit: Option<u64>,

    /// Non-improving steps allowed past the last best.
    #[arg(long, env = PLATEAU_VAR, value_name = "steps", default_value_t = DEFAULT_PLATEAU_TOLERANCE)]
    pub plateau: usize,

    /// Keep the solver idling for fact changes once it settles.
    #[arg(
        long,
        env = DAEMON_VAR,
        value_name = "bool",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub daemon: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 7860)),
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            step_limit: None,
            plateau: DEFAULT_PLATEAU_TOLERANCE,
            daemon: true,
        }
    }
}

impl AppConfig {
    pub fn solver(&self) -> SolverConfig {
        SolverConfig::default()
            .with_time_limit((self.time_limit_secs > 0).then(|| Duration::from_secs(self.time_limit_secs)))
            .with_step_limit(self.step_limit)
            .with_plateau_tolerance(self.plateau)
            .with_daemon(self.daemon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        AppConfig::command().debug_assert();
    }

    #[test]
    fn default_flags_match_default_config() {
        // Defaults only hold while the variables are unset.
        if [ADDR_VAR, TIME_LIMIT_VAR, STEP_LIMIT_VAR, PLATEAU_VAR, DAEMON_VAR]
            .iter()
            .any(|var| std::env::var_os(var).is_some())
        {
            return;
        }
        let parsed = AppConfig::try_parse_from(["route-optimizer"]).unwrap();
        assert_eq!(parsed, AppConfig::default());
        assert_eq!(parsed.solver(), SolverConfig::default());
    }

    #[test]
    fn every_setting_reaches_the_solver_config() {
        let config = AppConfig::try_parse_from([
            "route-optimizer",
            "--addr",
            "127.0.0.1:9000",
            "--time-limit-secs",
            "0",
            "--step-limit",
            "500",
            "--plateau",
            "7",
            "--daemon",
            "off",
        ])
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000".parse().unwrap());
        let solver = config.solver();
        assert_eq!(solver.time_limit, None);
        assert_eq!(solver.step_limit, Some(500));
        assert_eq!(solver.plateau_tolerance, 7);
        assert!(!solver.daemon);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::try_parse_from(["route-optimizer", "--plateau", "-1"]).is_err());
        assert!(AppConfig::try_parse_from(["route-optimizer", "--daemon", "maybe"]).is_err());
        assert!(AppConfig::try_parse_from(["route-optimizer", "--addr", "nowhere"]).is_err());
    }
}
