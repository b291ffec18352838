// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::sync::OnceLock;

pub const PRECISION_VAR: &str = "ZETA_PRECISION_DIGITS";
pub const TRUNCATION_VAR: &str = "ZETA_TRUNCATION";
pub const EPS_ZERO_VAR: &str = "ZETA_EPS_ZERO";

/// Largest working precision accepted from the environment.
const MAX_DIGITS: u32 = 1000;

/// Numeric defaults the tools fall back to when a run does not set them.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericDefaults {
    /// Working precision in significant decimal digits.
    pub precision_digits: u32,
    /// Series truncation bound N.
    pub truncation: u64,
    /// Zero-avoidance threshold of the probe.
    pub eps_zero: f64,
}

impl Default for NumericDefaults {
    fn default() -> Self {
        Self {
            precision_digits: 60,
            truncation: 20_000,
            eps_zero: 1e-10,
        }
    }
}

impl NumericDefaults {
    /// Builds a snapshot from environment variables. Unset or blank
    /// variables keep the built-in default; malformed ones are errors.
    pub fn from_env() -> Result<Self, DefaultsError> {
        let fallback = Self::default();
        let precision_digits = read_var(PRECISION_VAR)?
            .map(|raw| {
                raw.parse::<u32>()
                    .ok()
                    .filter(|d| (1..=MAX_DIGITS).contains(d))
                    .ok_or_else(|| invalid(PRECISION_VAR, &raw, "expected digits in 1..=1000"))
            })
            .transpose()?
            .unwrap_or(fallback.precision_digits);
        let truncation = read_var(TRUNCATION_VAR)?
            .map(|raw| {
                raw.parse::<u64>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| invalid(TRUNCATION_VAR, &raw, "expected a positive integer"))
            })
            .transpose()?
            .unwrap_or(fallback.truncation);
        let eps_zero = read_var(EPS_ZERO_VAR)?
            .map(|raw| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|e| e.is_finite() && *e > 0.0)
                    .ok_or_else(|| invalid(EPS_ZERO_VAR, &raw, "expected a positive number"))
            })
            .transpose()?
            .unwrap_or(fallback.eps_zero);

        Ok(Self {
            precision_digits,
            truncation,
            eps_zero,
        })
    }
}

static DEFAULTS: OnceLock<NumericDefaults> = OnceLock::new();

/// Returns the process-wide defaults, reading the environment on first use.
pub fn defaults() -> Result<&'static NumericDefaults, DefaultsError> {
    if let Some(cfg) = DEFAULTS.get() {
        return Ok(cfg);
    }
    let cfg = NumericDefaults::from_env()?;
    Ok(DEFAULTS.get_or_init(|| cfg))
}

/// Overrides the process-wide defaults. Intended for tests.
pub fn configure(cfg: NumericDefaults) -> &'static NumericDefaults {
    DEFAULTS.get_or_init(|| cfg)
}

fn read_var(key: &'static str) -> Result<Option<String>, DefaultsError> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(DefaultsError::Env { var: key, source }),
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> DefaultsError {
    DefaultsError::Invalid {
        var,
        value: value.to_string(),
        reason,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DefaultsError {
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("failed to read {var}: {source}")]
    Env {
        var: &'static str,
        source: std::env::VarError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::{Mutex, OnceLock};

    fn with_env(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let snapshot: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
                ((*key).to_string(), previous)
            })
            .collect();

        let result = catch_unwind(AssertUnwindSafe(test));

        for (key, value) in snapshot {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }

        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn unset_variables_keep_builtin_defaults() {
        with_env(
            &[
                (PRECISION_VAR, None),
                (TRUNCATION_VAR, None),
                (EPS_ZERO_VAR, Some("  ")),
            ],
            || {
                let cfg = NumericDefaults::from_env().unwrap();
                assert_eq!(cfg, NumericDefaults::default());
                assert_eq!(cfg.precision_digits, 60);
                assert_eq!(cfg.truncation, 20_000);
            },
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        with_env(
            &[
                (PRECISION_VAR, Some("70")),
                (TRUNCATION_VAR, Some("5000")),
                (EPS_ZERO_VAR, Some("1e-12")),
            ],
            || {
                let cfg = NumericDefaults::from_env().unwrap();
                assert_eq!(cfg.precision_digits, 70);
                assert_eq!(cfg.truncation, 5000);
                assert_eq!(cfg.eps_zero, 1e-12);
            },
        );
    }

    #[test]
    fn configured_defaults_are_served_process_wide() {
        // The only test in this binary that touches the process-wide cell.
        let pinned = NumericDefaults {
            precision_digits: 45,
            truncation: 1234,
            eps_zero: 1e-8,
        };
        let served = configure(pinned.clone());
        assert_eq!(served, &pinned);
        assert_eq!(defaults().unwrap(), &pinned);
        with_env(&[(TRUNCATION_VAR, Some("99"))], || {
            assert_eq!(defaults().unwrap().truncation, 1234);
        });
    }

    #[test]
    fn malformed_values_name_the_variable() {
        with_env(&[(TRUNCATION_VAR, Some("0"))], || {
            let err = NumericDefaults::from_env().unwrap_err();
            assert!(err.to_string().starts_with("ZETA_TRUNCATION="));
        });
        with_env(
            &[(TRUNCATION_VAR, None), (PRECISION_VAR, Some("sixty"))],
            || {
                assert!(matches!(
                    NumericDefaults::from_env(),
                    Err(DefaultsError::Invalid {
                        var: PRECISION_VAR,
                        ..
                    })
                ));
            },
        );
        with_env(
            &[(PRECISION_VAR, None), (EPS_ZERO_VAR, Some("-1"))],
            || {
                assert!(NumericDefaults::from_env().is_err());
            },
        );
    }
}
