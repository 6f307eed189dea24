//! # Back Office Configuration
//!
//! Settings the workflows need from outside the core: where the database
//! lives, who may discount how much, and which transfer and return flows
//! the business runs.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MERIDIAN_DB_PATH=/srv/meridian/backoffice.db                       │
//! │     MERIDIAN_TRANSFER_MODE=immediate                                   │
//! │     MERIDIAN_RETURNS_REQUIRE_APPROVAL=true                             │
//! │     MERIDIAN_EMPLOYEE_DISCOUNT_PERCENT=15                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/backoffice/backoffice.toml (Linux)                       │
//! │     ~/Library/Application Support/com.meridian.backoffice/ (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     staged transfers, auto-approved returns, 20% employee discount     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # backoffice.toml
//! [database]
//! path = "/srv/meridian/backoffice.db"
//! max_connections = 5
//!
//! [discounts]
//! unrestricted_roles = ["owner", "admin"]
//! default_max_percent = 0
//!
//! [discounts.max_percent]
//! manager = 30
//! cashier = 10
//!
//! [sales]
//! employee_discount_percent = 20
//!
//! [transfers]
//! mode = "staged"   # staged | immediate
//! superuser_roles = ["owner", "admin", "manager"]
//!
//! [returns]
//! require_approval = false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use meridian_core::{DiscountCeiling, DiscountPolicy, Rate, TransferMode};
use meridian_db::DbConfig;

use crate::error::{OpsError, OpsResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "meridian", "backoffice")
        .map(|dirs| dirs.data_dir().join("backoffice.db"))
        .unwrap_or_else(|| PathBuf::from("./backoffice.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Discount Settings
// =============================================================================

/// Role → line-discount ceiling table.
///
/// ## Default Table
/// ```text
/// owner, admin   unrestricted
/// manager        ≤ 30%
/// cashier        ≤ 10%
/// anyone else    0%
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountSettings {
    #[serde(default = "default_unrestricted_roles")]
    pub unrestricted_roles: Vec<String>,

    /// Ceiling for roles not listed anywhere.
    #[serde(default)]
    pub default_max_percent: u32,

    /// Whole-percent ceilings per role.
    #[serde(default = "default_max_percent")]
    pub max_percent: BTreeMap<String, u32>,
}

fn default_unrestricted_roles() -> Vec<String> {
    vec!["owner".to_string(), "admin".to_string()]
}

fn default_max_percent() -> BTreeMap<String, u32> {
    BTreeMap::from([("manager".to_string(), 30), ("cashier".to_string(), 10)])
}

impl Default for DiscountSettings {
    fn default() -> Self {
        DiscountSettings {
            unrestricted_roles: default_unrestricted_roles(),
            default_max_percent: 0,
            max_percent: default_max_percent(),
        }
    }
}

impl DiscountSettings {
    /// The capability table handed to the sale workflow.
    pub fn policy(&self) -> DiscountPolicy {
        let base = DiscountPolicy::new(DiscountCeiling::UpTo(Rate::from_percent(
            self.default_max_percent,
        )));
        let limited = self.max_percent.iter().fold(base, |policy, (role, pct)| {
            policy.with_role(role, DiscountCeiling::UpTo(Rate::from_percent(*pct)))
        });
        self.unrestricted_roles.iter().fold(limited, |policy, role| {
            policy.with_role(role, DiscountCeiling::Unrestricted)
        })
    }
}

// =============================================================================
// Workflow Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Flat discount on (subtotal − line discounts) for employee purchases.
    #[serde(default = "default_employee_discount")]
    pub employee_discount_percent: u32,
}

fn default_employee_discount() -> u32 {
    20
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            employee_discount_percent: default_employee_discount(),
        }
    }
}

impl SalesSettings {
    pub fn employee_rate(&self) -> Rate {
        Rate::from_percent(self.employee_discount_percent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Mode for transfers that do not ask for one explicitly.
    #[serde(default)]
    pub mode: TransferMode,

    /// Roles allowed to cancel a transfer someone else requested.
    #[serde(default = "default_superuser_roles")]
    pub superuser_roles: Vec<String>,
}

fn default_superuser_roles() -> Vec<String> {
    vec![
        "owner".to_string(),
        "admin".to_string(),
        "manager".to_string(),
    ]
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings {
            mode: TransferMode::default(),
            superuser_roles: default_superuser_roles(),
        }
    }
}

impl TransferSettings {
    pub fn is_superuser(&self, role: &str) -> bool {
        self.superuser_roles
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnSettings {
    /// When false, returns are approved as they are created.
    #[serde(default)]
    pub require_approval: bool,
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackOfficeConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub discounts: DiscountSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub transfers: TransferSettings,

    #[serde(default)]
    pub returns: ReturnSettings,
}

impl BackOfficeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (backoffice.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> OpsResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading back office config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> OpsResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| OpsError::config("No config path available"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Back office config saved");
        Ok(())
    }

    pub fn validate(&self) -> OpsResult<()> {
        if self.database.max_connections == 0 {
            return Err(OpsError::config("max_connections must be greater than 0"));
        }

        for (role, pct) in &self.discounts.max_percent {
            if *pct > 100 {
                return Err(OpsError::config(format!(
                    "discount ceiling for '{}' is {}%, must be at most 100%",
                    role, pct
                )));
            }
            if self
                .discounts
                .unrestricted_roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role))
            {
                return Err(OpsError::config(format!(
                    "role '{}' is both unrestricted and capped",
                    role
                )));
            }
        }

        if self.discounts.default_max_percent > 100 {
            return Err(OpsError::config("default_max_percent must be at most 100"));
        }

        if self.sales.employee_discount_percent > 100 {
            return Err(OpsError::config(
                "employee_discount_percent must be at most 100",
            ));
        }

        Ok(())
    }

    /// The pool settings for [`meridian_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `MERIDIAN_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MERIDIAN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(mode) = lookup("MERIDIAN_TRANSFER_MODE") {
            match mode.parse::<TransferMode>() {
                Ok(parsed) => {
                    debug!(mode = %parsed, "Overriding transfer mode from environment");
                    self.transfers.mode = parsed;
                }
                Err(e) => warn!(mode = %mode, error = %e, "Unknown transfer mode in environment"),
            }
        }

        if let Some(flag) = lookup("MERIDIAN_RETURNS_REQUIRE_APPROVAL") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.returns.require_approval = true,
                "0" | "false" | "no" | "off" => self.returns.require_approval = false,
                _ => warn!(value = %flag, "Unknown returns approval flag in environment"),
            }
        }

        if let Some(pct) = lookup("MERIDIAN_EMPLOYEE_DISCOUNT_PERCENT") {
            match pct.trim().parse::<u32>() {
                Ok(p) => self.sales.employee_discount_percent = p,
                Err(_) => warn!(value = %pct, "Invalid employee discount in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "meridian", "backoffice")
            .map(|dirs| dirs.config_dir().join("backoffice.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BackOfficeConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.transfers.mode, TransferMode::Staged);
        assert!(!config.returns.require_approval);
        assert_eq!(config.sales.employee_rate(), Rate::from_percent(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_discount_policy() {
        let policy = BackOfficeConfig::default().discounts.policy();
        assert_eq!(policy.ceiling_for("owner"), DiscountCeiling::Unrestricted);
        assert_eq!(
            policy.ceiling_for("Manager"),
            DiscountCeiling::UpTo(Rate::from_percent(30))
        );
        assert_eq!(
            policy.ceiling_for("cashier"),
            DiscountCeiling::UpTo(Rate::from_percent(10))
        );
        assert_eq!(
            policy.ceiling_for("stock_clerk"),
            DiscountCeiling::UpTo(Rate::zero())
        );
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let config: BackOfficeConfig = toml::from_str(
            r#"
            [transfers]
            mode = "immediate"

            [discounts.max_percent]
            cashier = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.transfers.mode, TransferMode::Immediate);
        assert!(config.transfers.is_superuser("ADMIN"));
        assert_eq!(config.discounts.max_percent.get("cashier"), Some(&5));
        assert!(!config.discounts.max_percent.contains_key("manager"));
        assert_eq!(config.sales.employee_discount_percent, 20);
    }

    #[test]
    fn test_validation_rejects_bad_ceilings() {
        let mut config = BackOfficeConfig::default();
        config.discounts.max_percent.insert("cashier".into(), 150);
        assert!(matches!(config.validate(), Err(OpsError::Config(_))));

        let mut config = BackOfficeConfig::default();
        config.discounts.max_percent.insert("Owner".into(), 50);
        assert!(config.validate().is_err());

        let mut config = BackOfficeConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MERIDIAN_DB_PATH", "/tmp/meridian-test.db"),
            ("MERIDIAN_TRANSFER_MODE", "Immediate"),
            ("MERIDIAN_RETURNS_REQUIRE_APPROVAL", "yes"),
            ("MERIDIAN_EMPLOYEE_DISCOUNT_PERCENT", "15"),
        ]);
        let mut config = BackOfficeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/meridian-test.db"));
        assert_eq!(config.transfers.mode, TransferMode::Immediate);
        assert!(config.returns.require_approval);
        assert_eq!(config.sales.employee_discount_percent, 15);
    }

    #[test]
    fn test_bad_override_is_ignored() {
        let mut config = BackOfficeConfig::default();
        config.apply_overrides(|key| match key {
            "MERIDIAN_TRANSFER_MODE" => Some("teleport".to_string()),
            "MERIDIAN_EMPLOYEE_DISCOUNT_PERCENT" => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config.transfers.mode, TransferMode::Staged);
        assert_eq!(config.sales.employee_discount_percent, 20);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "meridian-config-{}.toml",
            std::process::id()
        ));
        let mut config = BackOfficeConfig::default();
        config.returns.require_approval = true;
        config.database.path = PathBuf::from("/srv/meridian/backoffice.db");
        config.save(Some(path.clone())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: BackOfficeConfig = toml::from_str(&text).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(loaded.returns.require_approval);
        assert_eq!(loaded.database.path, PathBuf::from("/srv/meridian/backoffice.db"));
        assert_eq!(loaded.discounts.max_percent, default_max_percent());
    }
}
