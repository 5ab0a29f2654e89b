//! Configuration validation.
//!
//! Validation runs on the fully deserialized [`GameConfig`] and collects
//! every issue instead of stopping at the first one.

use std::collections::HashSet;

use crate::config::schema::{FILLER_SLOT, GameConfig, StrategyKind};
use crate::error::{Severity, ValidationIssue};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &GameConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_server(config);
        self.validate_round(config);
        self.validate_sides(config);
        self.validate_battle(config);
        self.validate_players(config);
        self.validate_ledger(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_server(&mut self, config: &GameConfig) {
        if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
            self.add_error("server.bind", "bind must be a socket address like 0.0.0.0:8087");
        }
        if config.server.heartbeat.is_zero() {
            self.add_error("server.heartbeat", "heartbeat interval must be positive");
        }
    }

    fn validate_round(&mut self, config: &GameConfig) {
        if config.round.betting_seconds == 0 {
            self.add_error("round.betting_seconds", "betting window must be at least 1 second");
        }
        if config.round.start_delay.is_zero() {
            self.add_warning(
                "round.start_delay",
                "zero start delay starts the battle as soon as betting closes",
            );
        }
        if config.round.cooldown == Some(0) {
            self.add_warning("round.cooldown", "zero cooldown restarts rounds immediately");
        }
    }

    fn validate_sides(&mut self, config: &GameConfig) {
        if config.sides.len() < 2 {
            self.add_error("sides", "at least two sides are required");
        }

        let mut seen = HashSet::new();
        for (i, side) in config.sides.iter().enumerate() {
            let name = side.name.trim();
            if name.is_empty() {
                self.add_error(&format!("sides[{i}].name"), "side name cannot be empty");
                continue;
            }
            if !seen.insert(name.to_lowercase()) {
                self.add_error(
                    &format!("sides[{i}].name"),
                    &format!("duplicate side name '{name}'"),
                );
            }
            if name != side.name || name.to_lowercase() != name {
                self.add_warning(
                    &format!("sides[{i}].name"),
                    "bets are matched against the lower-cased side name",
                );
            }
        }
    }

    fn validate_battle(&mut self, config: &GameConfig) {
        let battle = &config.battle;
        match battle.strategy {
            StrategyKind::Attrition => {
                for (i, side) in config.sides.iter().enumerate() {
                    if side.health == 0 {
                        self.add_error(
                            &format!("sides[{i}].health"),
                            "health must be positive for attrition battles",
                        );
                    }
                }
                if battle.damage.min == 0 {
                    self.add_error("battle.damage.min", "minimum damage must be at least 1");
                }
                if battle.damage.min > battle.damage.max {
                    self.add_error("battle.damage", "minimum damage exceeds maximum damage");
                }
                if battle.tick_interval.is_zero() {
                    self.add_error("battle.tick_interval", "tick interval must be positive");
                }
            }
            StrategyKind::SlotReveal => {
                if battle.cases.is_empty() {
                    self.validate_side_slots(config);
                } else {
                    self.validate_cases(config);
                }
                for (i, side) in config.sides.iter().enumerate() {
                    if side.name.trim().eq_ignore_ascii_case(FILLER_SLOT) {
                        self.add_error(
                            &format!("sides[{i}].name"),
                            &format!("'{FILLER_SLOT}' is reserved for filler slots"),
                        );
                    }
                }
            }
        }
        if battle.strategy != StrategyKind::SlotReveal && !battle.cases.is_empty() {
            self.add_warning("battle.cases", "cases are only used by slot_reveal battles");
        }
    }

    fn validate_side_slots(&mut self, config: &GameConfig) {
        let total: u64 = config.sides.iter().map(|s| u64::from(s.slots)).sum();
        if total == 0 {
            self.add_error("sides", "slot reveal requires at least one slot");
        }
        for (i, side) in config.sides.iter().enumerate() {
            if side.slots == 0 {
                self.add_warning(
                    &format!("sides[{i}].slots"),
                    "side has no slots and can never win",
                );
            }
        }
    }

    fn validate_cases(&mut self, config: &GameConfig) {
        let sides: HashSet<String> = config.sides.iter().map(|s| s.name.to_lowercase()).collect();
        let mut keys = HashSet::new();
        let mut dealt = HashSet::new();

        for (i, case) in config.battle.cases.iter().enumerate() {
            let path = format!("battle.cases[{i}]");
            if case.key.trim().is_empty() {
                self.add_error(&format!("{path}.key"), "case key cannot be empty");
            } else if !keys.insert(case.key.clone()) {
                self.add_error(
                    &format!("{path}.key"),
                    &format!("duplicate case key '{}'", case.key),
                );
            }
            if case.is_empty() {
                self.add_error(&path, "case must deal at least one slot");
            }
            for (name, count) in &case.slots {
                if !sides.contains(&name.to_lowercase()) {
                    self.add_error(
                        &format!("{path}.slots.{name}"),
                        &format!("'{name}' is not a configured side"),
                    );
                } else if *count > 0 {
                    dealt.insert(name.to_lowercase());
                }
            }
        }

        for (i, side) in config.sides.iter().enumerate() {
            if !dealt.contains(&side.name.to_lowercase()) {
                self.add_warning(
                    &format!("sides[{i}]"),
                    "side has no slots in any case and can never win",
                );
            }
        }
    }

    fn validate_players(&mut self, config: &GameConfig) {
        let balance = config.players.starting_balance;
        if !balance.is_finite() || balance < 0.0 {
            self.add_error(
                "players.starting_balance",
                "starting balance must be a finite non-negative number",
            );
        }
        if config.players.max_name_len == 0 {
            self.add_error("players.max_name_len", "name length must be at least 1");
        }
    }

    fn validate_ledger(&mut self, config: &GameConfig) {
        if !config.ledger.enabled {
            return;
        }
        if config.ledger.max_tx_per_block == 0 {
            self.add_error("ledger.max_tx_per_block", "blocks must hold at least one transaction");
        }
        if config.ledger.block_interval.is_zero() {
            self.add_error("ledger.block_interval", "block interval must be positive");
        }
        if config.ledger.path.as_os_str().is_empty() {
            self.add_error("ledger.path", "ledger path cannot be empty");
        }
    }

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
