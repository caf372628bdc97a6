//! Colorful console output for solver metrics.
//!
//! Everything here is a no-op unless the `console` feature is enabled.

use chrono::Local;
use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::score::HardSoftScore;

const ENABLED: bool = cfg!(feature = "console");

/// ASCII art banner for server startup.
pub fn print_banner() {
    if !ENABLED {
        return;
    }
    let banner = r#"
  ____             _          ___        _   _           _
 |  _ \ ___  _   _| |_ ___   / _ \ _ __ | |_(_)_ __ ___ (_)_______ _ __
 | |_) / _ \| | | | __/ _ \ | | | | '_ \| __| | '_ ` _ \| |_  / _ \ '__|
 |  _ < (_) | |_| | ||  __/ | |_| | |_) | |_| | | | | | | |/ /  __/ |
 |_| \_\___/ \__,_|\__\___|  \___/| .__/ \__|_|_| |_| |_|_/___\___|_|
                                  |_|
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Live Vehicle Routing".bright_cyan()
    );
}

fn prefix(source: &str) -> String {
    format!(
        "{} {} {}",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", source).bright_cyan()
    )
}

/// Prints the problem size a run starts with.
pub fn print_config(run_id: Uuid, vehicles: usize, visits: usize, unassigned: usize) {
    if !ENABLED {
        return;
    }
    println!(
        "{} Run {}: vehicles ({}), visits ({}), unassigned ({})",
        prefix("Solver"),
        run_id.to_string().bright_black(),
        vehicles.to_formatted_string(&Locale::en).bright_yellow(),
        visits.to_formatted_string(&Locale::en).bright_yellow(),
        unassigned.to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints "Solving started" once the first solution is constructed.
pub fn print_solving_started(time_spent: Duration, best_score: HardSoftScore, visits: usize, vehicles: usize) {
    if !ENABLED {
        return;
    }
    println!(
        "{} Solving started: time spent ({}), best score ({}), problem scale ({})",
        prefix("Solver"),
        format_duration(time_spent).yellow(),
        format_score(best_score),
        calculate_problem_scale(visits, visits + vehicles).bright_magenta()
    );
}

/// Prints a phase start message.
pub fn print_phase_start(phase_name: &str, phase_index: usize) {
    if !ENABLED {
        return;
    }
    println!(
        "{} {} phase ({}) started",
        prefix(phase_name),
        phase_name.white().bold(),
        phase_index.to_string().yellow()
    );
}

/// Prints a phase end message with metrics.
pub fn print_phase_end(
    phase_name: &str,
    phase_index: usize,
    duration: Duration,
    steps_accepted: u64,
    moves_evaluated: u64,
    best_score: HardSoftScore,
) {
    if !ENABLED {
        return;
    }
    let acceptance_rate = if moves_evaluated > 0 {
        (steps_accepted as f64 / moves_evaluated as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "{} {} phase ({}) ended: time spent ({}), best score ({}), move evaluation speed ({}/sec), step total ({}, {:.1}% accepted)",
        prefix(phase_name),
        phase_name.white().bold(),
        phase_index.to_string().yellow(),
        format_duration(duration).yellow(),
        format_score(best_score),
        moves_per_sec(moves_evaluated, duration)
            .to_formatted_string(&Locale::en)
            .bright_magenta()
            .bold(),
        steps_accepted.to_formatted_string(&Locale::en).white(),
        acceptance_rate
    );
}

/// Prints a summary of one applied fact-change batch.
pub fn print_fact_changes(applied: usize, failed: usize, score: HardSoftScore) {
    if !ENABLED {
        return;
    }
    let failed_str = if failed > 0 {
        failed.to_string().bright_red().to_string()
    } else {
        failed.to_string().white().to_string()
    };
    println!(
        "{} Fact changes applied ({}), failed ({}), score ({})",
        prefix("Solver"),
        applied.to_formatted_string(&Locale::en).bright_yellow(),
        failed_str,
        format_score(score)
    );
}

/// Prints solver completion summary.
pub fn print_solving_ended(total_duration: Duration, total_moves: u64, final_score: HardSoftScore) {
    if !ENABLED {
        return;
    }
    let speed = moves_per_sec(total_moves, total_duration);

    println!(
        "{} Solving ended: time spent ({}), best score ({}), move evaluation speed ({}/sec)",
        prefix("Solver"),
        format_duration(total_duration).yellow(),
        format_score(final_score),
        speed.to_formatted_string(&Locale::en).bright_magenta().bold()
    );

    // Pretty summary box (60 chars wide, 56 char content area)
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let is_feasible = final_score.is_feasible();
    let status_text = if is_feasible {
        "✓ FEASIBLE SOLUTION FOUND"
    } else {
        "✗ INFEASIBLE (hard constraints violated)"
    };
    let status_colored = if is_feasible {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56 - status_text.chars().count();
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    let rows = [
        ("Final Score:", final_score.to_string()),
        ("Solving Time:", format!("{:.2}s", total_duration.as_secs_f64())),
        ("Move Speed:", format!("{}/sec", speed.to_formatted_string(&Locale::en))),
    ];
    for (label, value) in rows {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

fn moves_per_sec(moves: u64, elapsed: Duration) -> u64 {
    if elapsed.as_secs_f64() > 0.0 {
        (moves as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    }
}

/// Formats a duration nicely.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

/// Formats a score with colors based on feasibility.
fn format_score(score: HardSoftScore) -> String {
    let hard_str = if score.hard() < 0 {
        format!("{}hard", score.hard()).bright_red().to_string()
    } else {
        format!("{}hard", score.hard()).bright_green().to_string()
    };
    let soft_str = if score.soft() < 0 {
        format!("{}soft", score.soft()).yellow().to_string()
    } else {
        format!("{}soft", score.soft()).white().to_string()
    };
    format!("{}/{}", hard_str, soft_str)
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Calculates an approximate problem scale: each visit picks one of
/// `value_count` predecessors.
fn calculate_problem_scale(entity_count: usize, value_count: usize) -> String {
    if entity_count == 0 || value_count == 0 {
        return "0".to_string();
    }

    let log_scale = (entity_count as f64) * (value_count as f64).log10();
    let exponent = log_scale.floor() as i32;
    let mantissa = 10f64.powf(log_scale - exponent as f64);

    format!("{:.3} × 10^{}", mantissa, exponent)
}

/// A timer for tracking phase durations and move counts.
pub struct PhaseTimer {
    start: Instant,
    phase_name: &'static str,
    phase_index: usize,
    steps_accepted: u64,
    moves_evaluated: u64,
}

impl PhaseTimer {
    pub fn start(phase_name: &'static str, phase_index: usize) -> Self {
        print_phase_start(phase_name, phase_index);
        Self {
            start: Instant::now(),
            phase_name,
            phase_index,
            steps_accepted: 0,
            moves_evaluated: 0,
        }
    }

    pub fn record_accepted(&mut self, steps: u64) {
        self.steps_accepted += steps;
    }

    pub fn record_moves(&mut self, moves: u64) {
        self.moves_evaluated += moves;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn moves_evaluated(&self) -> u64 {
        self.moves_evaluated
    }

    pub fn finish(self, best_score: HardSoftScore) {
        print_phase_end(
            self.phase_name,
            self.phase_index,
            self.start.elapsed(),
            self.steps_accepted,
            self.moves_evaluated,
            best_score,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_a_readable_unit() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn problem_scale_is_a_power_of_ten() {
        assert_eq!(calculate_problem_scale(0, 5), "0");
        assert_eq!(calculate_problem_scale(2, 10), "1.000 × 10^2");
    }
}
