use serde::Deserialize;

/// Options accepted by the `make_*` functions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ObservableOptions {
    /// Make inferred actions bound to their object.
    pub auto_bind: bool,
    /// Infer `observable` for fields; `observable.ref` when false.
    pub deep: bool,
    /// Debug name of the object. Only shows up in diagnostics.
    pub name: Option<String>,
}

impl Default for ObservableOptions {
    fn default() -> Self {
        Self {
            auto_bind: false,
            deep: true,
            name: None,
        }
    }
}

impl ObservableOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Load from JSON such as `{"autoBind": true, "deep": false}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ObservableOptions::from_json("{}").unwrap();
        assert_eq!(options, ObservableOptions::default());
        assert!(options.deep);
        assert!(!options.auto_bind);
    }

    #[test]
    fn camel_case_keys() {
        let options =
            ObservableOptions::from_json(r#"{"autoBind": true, "deep": false, "name": "store"}"#)
                .unwrap();
        assert!(options.auto_bind);
        assert!(!options.deep);
        assert_eq!(options.name.as_deref(), Some("store"));

        assert!(ObservableOptions::from_json(r#"{"proxy": false}"#).is_err());
    }
}
