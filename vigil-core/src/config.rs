//! Runtime configuration.
//!
//! Configuration is per thread, like the rest of the runtime state. It can
//! be built in code or loaded from JSON:
//!
//! ```rust
//! use vigil_core::config::{configure, Configuration, EnforceActions};
//!
//! let config = Configuration::from_json(r#"{ "enforce_actions": "observed" }"#).unwrap();
//! assert_eq!(config.enforce_actions, EnforceActions::Observed);
//! configure(config);
//! ```

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

/// When writes outside an action are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforceActions {
    /// Direct assignment is always fine.
    #[default]
    Never,
    /// Warn when an observed value is written outside an action.
    Observed,
    /// Warn on every write outside an action.
    Always,
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub enforce_actions: EnforceActions,
    /// Flush passes allowed before reactions are considered divergent.
    pub max_reaction_iterations: usize,
    /// Warn when a computed value is read outside any reaction.
    pub computed_requires_reaction: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            enforce_actions: EnforceActions::Never,
            max_reaction_iterations: 100,
            computed_requires_reaction: false,
        }
    }
}

impl Configuration {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

thread_local! {
    static CONFIG: RefCell<Configuration> = RefCell::new(Configuration::default());
}

/// Install `config` for the current thread.
pub fn configure(config: Configuration) {
    tracing::debug!(?config, "runtime configured");
    CONFIG.with(|current| *current.borrow_mut() = config);
}

/// The configuration active on the current thread.
pub fn configuration() -> Configuration {
    CONFIG.with(|current| current.borrow().clone())
}

pub(crate) fn with_configuration<R>(f: impl FnOnce(&Configuration) -> R) -> R {
    CONFIG.with(|current| f(&current.borrow()))
}
