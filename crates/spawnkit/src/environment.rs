//! Environment variables handed to a child process.
//!
//! A builder without an [`Environment`] lets the child inherit the caller's
//! environment. With one, the child sees exactly the variables it holds.

use serde::{Deserialize, Serialize};
use spawnkit_common::{SpawnError, SpawnResult};
use std::collections::BTreeMap;
use std::ffi::CString;

/// Ordered mapping from variable name to value.
///
/// # Example
/// ```
/// use spawnkit::Environment;
///
/// let mut env = Environment::new();
/// env.set("LANG", "C").set("HOME", "/tmp");
///
/// let array = env.to_environment_array().unwrap();
/// assert_eq!(array[0].to_str().unwrap(), "HOME=/tmp");
/// assert_eq!(array[1].to_str().unwrap(), "LANG=C");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calling process's environment. Entries that are not
    /// valid UTF-8 are skipped.
    pub fn from_current() -> Self {
        std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Checks that every entry can be passed to the OS.
    pub fn validate(&self) -> SpawnResult<()> {
        for (name, value) in &self.vars {
            validate_entry(name, value)?;
        }
        Ok(())
    }

    /// `KEY=VALUE` strings in name order, as consumed by `execve`.
    ///
    /// The terminating null pointer is added by the spawner, not here.
    pub fn to_environment_array(&self) -> SpawnResult<Vec<CString>> {
        self.vars
            .iter()
            .map(|(name, value)| {
                validate_entry(name, value)?;
                CString::new(format!("{}={}", name, value))
                    .map_err(|e| SpawnError::invalid_environment(name.as_str(), e.to_string()))
            })
            .collect()
    }

    /// UTF-16 environment block as consumed by `CreateProcessW` with
    /// `CREATE_UNICODE_ENVIRONMENT`: `KEY=VALUE\0` entries sorted
    /// case-insensitively by name, followed by one extra `\0`.
    pub fn to_environment_block(&self) -> SpawnResult<Vec<u16>> {
        let mut entries: Vec<(&String, &String)> = self.vars.iter().collect();
        entries.sort_by_key(|(name, _)| name.to_uppercase());

        let mut block = Vec::new();
        for (name, value) in entries {
            validate_entry(name, value)?;
            block.extend(name.encode_utf16());
            block.push(u16::from(b'='));
            block.extend(value.encode_utf16());
            block.push(0);
        }
        // An empty block still needs two terminators.
        if block.is_empty() {
            block.push(0);
        }
        block.push(0);
        Ok(block)
    }
}

fn validate_entry(name: &str, value: &str) -> SpawnResult<()> {
    if name.is_empty() {
        return Err(SpawnError::invalid_environment(name, "name is empty"));
    }
    if name.contains('=') {
        return Err(SpawnError::invalid_environment(name, "name contains '='"));
    }
    if name.contains('\0') {
        return Err(SpawnError::invalid_environment(name, "name contains a NUL byte"));
    }
    if value.contains('\0') {
        return Err(SpawnError::invalid_environment(name, "value contains a NUL byte"));
    }
    Ok(())
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V> Extend<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.vars
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnkit_common::ErrorKind;

    fn utf16(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_set_get_remove() {
        let mut env = Environment::new();
        assert!(env.is_empty());
        env.set("A", "1").set("B", "2");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("A"), Some("1"));
        assert!(env.contains("B"));
        assert_eq!(env.remove("A"), Some("1".to_string()));
        assert_eq!(env.get("A"), None);
    }

    #[test]
    fn test_environment_array_is_sorted() {
        let env: Environment = [("ZED", "last"), ("ALPHA", "first=1")].into_iter().collect();
        let array = env.to_environment_array().unwrap();
        let rendered: Vec<&str> = array.iter().map(|c| c.to_str().unwrap()).collect();
        assert_eq!(rendered, vec!["ALPHA=first=1", "ZED=last"]);
    }

    #[test]
    fn test_environment_block_layout() {
        let env: Environment = [("b", "2"), ("A", "1")].into_iter().collect();
        let block = env.to_environment_block().unwrap();

        let mut expected = utf16("A=1");
        expected.push(0);
        expected.extend(utf16("b=2"));
        expected.push(0);
        expected.push(0);
        assert_eq!(block, expected);
    }

    #[test]
    fn test_empty_environment_block() {
        assert_eq!(Environment::new().to_environment_block().unwrap(), vec![0, 0]);
        assert!(Environment::new().to_environment_array().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let cases = [("", "v"), ("A=B", "v"), ("NUL\0", "v"), ("OK", "bad\0value")];
        for (name, value) in cases {
            let mut env = Environment::new();
            env.set(name, value);
            assert_eq!(env.validate().unwrap_err().kind(), ErrorKind::InvalidEnvironment);
            assert!(env.to_environment_array().is_err());
            assert!(env.to_environment_block().is_err());
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_from_current_matches_process_env() {
        let env = Environment::from_current();
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(env.get("PATH"), Some(path.as_str()));
        }
    }

    #[test]
    fn test_serde_transparent_map() {
        let env: Environment = serde_yaml::from_str("FOO: bar\nBAZ: qux\n").unwrap();
        assert_eq!(env.get("FOO"), Some("bar"));
        assert_eq!(env.len(), 2);
    }
}
