//! Optimizer configuration.
//!
//! Every pass is enabled by default. Passes can be switched off in code
//! with the `with_*` builders or from the environment:
//!
//! - `TRELLIS_OPT_DISABLE`: comma-separated pass names (see [`PassKind`]).
//! - `TRELLIS_TRIVIAL_INLINE_LIMIT`: scopes with fewer non-parameter
//!   Computables than this are inlined by the trivial-inline pass.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::inline::InlinePolicy;

/// Environment variable listing disabled passes.
pub const DISABLE_VAR: &str = "TRELLIS_OPT_DISABLE";

/// Environment variable overriding the trivial-inline limit.
pub const TRIVIAL_LIMIT_VAR: &str = "TRELLIS_TRIVIAL_INLINE_LIMIT";

/// One optimizer pass, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    DeadCode,
    InlineSingleInstance,
    InlineTrivial,
    Pushdown,
    ElementArguments,
}

impl PassKind {
    /// Every pass, in the order the pipeline runs them.
    pub const ALL: [PassKind; 5] = [
        PassKind::DeadCode,
        PassKind::InlineSingleInstance,
        PassKind::InlineTrivial,
        PassKind::Pushdown,
        PassKind::ElementArguments,
    ];

    /// Stable kebab-case name.
    pub fn name(self) -> &'static str {
        match self {
            PassKind::DeadCode => "dead-code",
            PassKind::InlineSingleInstance => "inline-single-instance",
            PassKind::InlineTrivial => "inline-trivial",
            PassKind::Pushdown => "pushdown",
            PassKind::ElementArguments => "element-arguments",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PassKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassKind::ALL
            .into_iter()
            .find(|pass| pass.name() == s)
            .ok_or_else(|| ConfigError::UnknownPass(s.to_owned()))
    }
}

/// Invalid configuration input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown optimizer pass `{0}`")]
    UnknownPass(String),
    #[error("invalid value `{value}` for {var}: expected a non-negative integer")]
    InvalidLimit { var: &'static str, value: String },
}

/// Which passes run, and how.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizerConfig {
    disabled: Vec<PassKind>,
    trivial_inline_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            trivial_inline_limit: InlinePolicy::DEFAULT_TRIVIAL_LIMIT,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read overrides through `lookup` (the environment, in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(list) = lookup(DISABLE_VAR) {
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                config = config.with_pass(name.parse()?, false);
            }
        }
        if let Some(raw) = lookup(TRIVIAL_LIMIT_VAR) {
            let limit = raw.trim().parse().map_err(|_| ConfigError::InvalidLimit {
                var: TRIVIAL_LIMIT_VAR,
                value: raw.clone(),
            })?;
            config = config.with_trivial_inline_limit(limit);
        }
        Ok(config)
    }

    /// Enable or disable `pass`.
    #[must_use]
    pub fn with_pass(mut self, pass: PassKind, enabled: bool) -> Self {
        self.disabled.retain(|p| *p != pass);
        if !enabled {
            self.disabled.push(pass);
        }
        self
    }

    /// Run only `passes`.
    #[must_use]
    pub fn with_only(mut self, passes: &[PassKind]) -> Self {
        self.disabled = PassKind::ALL
            .into_iter()
            .filter(|p| !passes.contains(p))
            .collect();
        self
    }

    #[must_use]
    pub fn with_trivial_inline_limit(mut self, limit: usize) -> Self {
        self.trivial_inline_limit = limit;
        self
    }

    pub fn is_enabled(&self, pass: PassKind) -> bool {
        !self.disabled.contains(&pass)
    }

    pub fn trivial_inline_limit(&self) -> usize {
        self.trivial_inline_limit
    }

    /// Enabled passes, in pipeline order.
    pub fn enabled_passes(&self) -> impl Iterator<Item = PassKind> + '_ {
        PassKind::ALL.into_iter().filter(|p| self.is_enabled(*p))
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn pass_names_round_trip() {
        for pass in PassKind::ALL {
            assert_eq!(pass.to_string().parse::<PassKind>().unwrap(), pass);
        }
        assert_eq!(
            "inline".parse::<PassKind>().unwrap_err(),
            ConfigError::UnknownPass("inline".to_owned())
        );
    }

    #[test]
    fn defaults_enable_everything() {
        let config = OptimizerConfig::default();
        assert_eq!(config.enabled_passes().collect::<Vec<_>>(), PassKind::ALL);
        assert_eq!(config.trivial_inline_limit(), 3);
    }

    #[test]
    fn environment_disables_listed_passes() {
        let vars = [(DISABLE_VAR, "pushdown, dead-code"), (TRIVIAL_LIMIT_VAR, "5")];
        let config = OptimizerConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(!config.is_enabled(PassKind::Pushdown));
        assert!(!config.is_enabled(PassKind::DeadCode));
        assert!(config.is_enabled(PassKind::InlineTrivial));
        assert_eq!(config.trivial_inline_limit(), 5);
    }

    #[test]
    fn environment_errors_are_reported() {
        let vars = [(DISABLE_VAR, "dead-code,bogus")];
        assert_eq!(
            OptimizerConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::UnknownPass("bogus".to_owned())
        );
        let vars = [(TRIVIAL_LIMIT_VAR, "-1")];
        assert!(matches!(
            OptimizerConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::InvalidLimit { .. }
        ));
    }

    #[test]
    fn with_only_keeps_pipeline_order() {
        let config =
            OptimizerConfig::new().with_only(&[PassKind::ElementArguments, PassKind::DeadCode]);
        assert_eq!(
            config.enabled_passes().collect::<Vec<_>>(),
            vec![PassKind::DeadCode, PassKind::ElementArguments]
        );
        let config = config.with_pass(PassKind::Pushdown, true);
        assert!(config.is_enabled(PassKind::Pushdown));
    }
}
