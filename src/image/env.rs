//! Environment contract carried by a provisioned image
//!
//! The pipeline stages build up an ordered set of environment variables that
//! ends up verbatim in the image config. Ordering matters: the config lists
//! variables in the order stages declared them, and `PATH` manipulation is
//! prepend-only so that later stages win process resolution without erasing
//! what earlier stages established.

/// Name of the environment variable holding the isolated environment root.
pub const VENV_ENV: &str = "VENV";

/// Identity variable consumed by the workflow registration system.
pub const IDENTITY_ENV: &str = "FLYTE_INTERNAL_IMAGE";

/// Default executable search path of the base runtime distribution.
pub const BASE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Ordered environment variable set.
///
/// `set` keeps the position of an existing key and replaces its value;
/// new keys append. This mirrors how an image build accumulates `ENV`
/// instructions.
#[derive(Debug, Clone, Default)]
pub struct EnvContract {
    entries: Vec<(String, String)>,
}

impl EnvContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing the value in place if the key exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Prepend a directory to `PATH`, creating it from `BASE_PATH` if unset.
    pub fn prepend_path(&mut self, dir: &str) {
        let current = self
            .get("PATH")
            .map(str::to_string)
            .unwrap_or_else(|| BASE_PATH.to_string());
        self.set("PATH", format!("{}:{}", dir, current));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as the `KEY=VALUE` strings an image config expects.
    pub fn to_config_strings(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_appends_in_order() {
        let mut env = EnvContract::new();
        env.set("LANG", "C.UTF-8");
        env.set("LC_ALL", "C.UTF-8");

        let rendered = env.to_config_strings();
        assert_eq!(rendered, vec!["LANG=C.UTF-8", "LC_ALL=C.UTF-8"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut env = EnvContract::new();
        env.set("A", "1");
        env.set("B", "2");
        env.set("A", "3");

        assert_eq!(env.get("A"), Some("3"));
        assert_eq!(env.to_config_strings(), vec!["A=3", "B=2"]);
    }

    #[test]
    fn test_prepend_path_without_existing_path() {
        let mut env = EnvContract::new();
        env.prepend_path("/opt/venv/bin");

        let path = env.get("PATH").unwrap();
        assert!(path.starts_with("/opt/venv/bin:"));
        assert!(path.ends_with(BASE_PATH));
    }

    #[test]
    fn test_prepend_path_keeps_existing_tail() {
        let mut env = EnvContract::new();
        env.set("PATH", BASE_PATH);
        env.prepend_path("/opt/venv/bin");

        assert_eq!(
            env.get("PATH").unwrap(),
            format!("/opt/venv/bin:{}", BASE_PATH)
        );
    }

    #[test]
    fn test_identity_env_may_be_empty() {
        let mut env = EnvContract::new();
        env.set(IDENTITY_ENV, "");

        assert_eq!(env.get(IDENTITY_ENV), Some(""));
        assert!(env
            .to_config_strings()
            .contains(&format!("{}=", IDENTITY_ENV)));
    }
}
