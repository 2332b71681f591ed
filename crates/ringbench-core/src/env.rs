//! `RINGBENCH_*` variable reader behind `EngineConfig::from_env()`.
//!
//! Names are given without the prefix. A value that is set but does not
//! parse is ignored with a warning, so a typo never silently turns into a
//! different setting.

use std::collections::HashMap;
use std::str::FromStr;

pub const PREFIX: &str = "RINGBENCH_";

type Lookup = Box<dyn Fn(&str) -> Option<String>>;

pub struct EnvSource {
    lookup: Lookup,
}

impl EnvSource {
    /// The process environment.
    pub fn process() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// A fixed table keyed by full variable name.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table: HashMap<String, String> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            lookup: Box::new(move |key| table.get(key).cloned()),
        }
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{PREFIX}{name}");
        let val = (self.lookup)(&key)?;
        Some((key, val.trim().to_string()))
    }

    pub fn opt<T: FromStr>(&self, name: &str) -> Option<T> {
        let (key, val) = self.raw(name)?;
        match val.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(%key, %val, "ignoring unparsable value");
                None
            }
        }
    }

    pub fn get<T: FromStr>(&self, name: &str, default: T) -> T {
        self.opt(name).unwrap_or(default)
    }

    /// On/off switch: `1 true yes on` and `0 false no off`, any case.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        let Some((key, val)) = self.raw(name) else {
            return default;
        };
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                tracing::warn!(%key, %val, "ignoring unrecognised switch");
                default
            }
        }
    }

    /// Milliseconds variable as a duration.
    pub fn millis(&self, name: &str, default: std::time::Duration) -> std::time::Duration {
        self.opt::<u64>(name)
            .map(std::time::Duration::from_millis)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn source(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_unset_falls_back() {
        let env = source(&[]);
        assert_eq!(env.get::<u32>("DEPTH", 32), 32);
        assert_eq!(env.opt::<u32>("SQPOLL_CPU"), None);
        assert!(env.flag("POLLED", true));
    }

    #[test]
    fn test_prefix_and_trim() {
        let env = source(&[("RINGBENCH_DEPTH", " 64 "), ("DEPTH", "8")]);
        assert_eq!(env.get::<u32>("DEPTH", 32), 64);
    }

    #[test]
    fn test_unparsable_keeps_default() {
        let env = source(&[("RINGBENCH_QUEUES", "lots"), ("RINGBENCH_SQPOLL_CPU", "-1")]);
        assert_eq!(env.get::<usize>("QUEUES", 1), 1);
        assert_eq!(env.opt::<u32>("SQPOLL_CPU"), None);
    }

    #[test]
    fn test_flag_words() {
        let env = source(&[
            ("RINGBENCH_A", "YES"),
            ("RINGBENCH_B", "off"),
            ("RINGBENCH_C", "maybe"),
        ]);
        assert!(env.flag("A", false));
        assert!(!env.flag("B", true));
        assert!(env.flag("C", true));
        assert!(!env.flag("C", false));
    }

    #[test]
    fn test_millis() {
        let env = source(&[("RINGBENCH_INTERVAL_MS", "250")]);
        assert_eq!(env.millis("INTERVAL_MS", Duration::from_secs(1)), Duration::from_millis(250));
        assert_eq!(env.millis("SQPOLL_IDLE_MS", Duration::from_secs(1)), Duration::from_secs(1));
    }
}
