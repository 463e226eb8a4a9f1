use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing config path: {0}")]
    Missing(String),
    #[error("wrong type at config path {path}: expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid duration value: {0}")]
    InvalidDuration(String),
}

/// One node in a configuration tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Table(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Str(_) => "string",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Array(_) => "array",
            ConfigValue::Table(_) => "table",
        }
    }
}

/// An immutable, layered configuration tree.
///
/// Lookup paths are dot separated (`remoting.stripe-count`). Values
/// keep the natural type the loader produced; getters convert where
/// the conversion is lossless.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    root: BTreeMap<String, ConfigValue>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Parses a TOML document into a config tree.
    pub fn from_toml_str(s: &str) -> Result<Config, ConfigError> {
        let value: toml::Value =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        match toml_value(value) {
            ConfigValue::Table(root) => Ok(Config { root }),
            other => Err(ConfigError::Parse(format!(
                "top level must be a table, found {}",
                other.type_name()
            ))),
        }
    }

    /// Parses a JSON document into a config tree.
    pub fn from_json_str(s: &str) -> Result<Config, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        match json_value(value) {
            Some(ConfigValue::Table(root)) => Ok(Config { root }),
            Some(other) => Err(ConfigError::Parse(format!(
                "top level must be an object, found {}",
                other.type_name()
            ))),
            None => Err(ConfigError::Parse("top level must be an object".into())),
        }
    }

    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        self.lookup(path)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn lookup(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.').peekable();
        let mut table = &self.root;
        loop {
            let part = parts.next()?;
            let node = table.get(part)?;
            if parts.peek().is_none() {
                return Some(node);
            }
            match node {
                ConfigValue::Table(t) => table = t,
                _ => return None,
            }
        }
    }

    pub fn get_str(&self, path: &str) -> Result<String, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Str(s)) => Ok(s.clone()),
            Some(other) => Err(wrong_type(path, "string", other)),
        }
    }

    pub fn get_str_or(&self, path: &str, default: &str) -> String {
        self.get_str(path).unwrap_or_else(|_| default.to_string())
    }

    pub fn get_int(&self, path: &str) -> Result<i64, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Int(i)) => Ok(*i),
            Some(other) => Err(wrong_type(path, "int", other)),
        }
    }

    pub fn get_int_or(&self, path: &str, default: i64) -> i64 {
        match self.lookup(path) {
            Some(ConfigValue::Int(i)) => *i,
            _ => default,
        }
    }

    pub fn get_float(&self, path: &str) -> Result<f64, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Float(f)) => Ok(*f),
            Some(ConfigValue::Int(i)) => Ok(*i as f64),
            Some(other) => Err(wrong_type(path, "float", other)),
        }
    }

    pub fn get_float_or(&self, path: &str, default: f64) -> f64 {
        self.get_float(path).unwrap_or(default)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Bool(b)) => Ok(*b),
            Some(other) => Err(wrong_type(path, "bool", other)),
        }
    }

    pub fn get_bool_or(&self, path: &str, default: bool) -> bool {
        self.get_bool(path).unwrap_or(default)
    }

    pub fn get_array(&self, path: &str) -> Result<Vec<ConfigValue>, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Array(a)) => Ok(a.clone()),
            Some(other) => Err(wrong_type(path, "array", other)),
        }
    }

    /// Durations accept `ns/us/ms/s/m/h/d` suffixes; a bare number is
    /// milliseconds.
    pub fn get_duration(&self, path: &str) -> Result<Duration, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Int(ms)) => Ok(Duration::from_millis((*ms).max(0) as u64)),
            Some(ConfigValue::Float(ms)) => Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0)),
            Some(ConfigValue::Str(s)) => parse_duration(s),
            Some(other) => Err(wrong_type(path, "duration", other)),
        }
    }

    pub fn get_duration_or(&self, path: &str, default: Duration) -> Duration {
        self.get_duration(path).unwrap_or(default)
    }

    /// Returns the subtree at `path` as its own `Config`.
    pub fn get_config(&self, path: &str) -> Result<Config, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::Missing(path.to_string())),
            Some(ConfigValue::Table(t)) => Ok(Config { root: t.clone() }),
            Some(other) => Err(wrong_type(path, "table", other)),
        }
    }

    /// Deep merge where `self` wins over `other`.
    pub fn with_fallback(&self, other: &Config) -> Config {
        Config {
            root: merge_tables(&other.root, &self.root),
        }
    }

    /// Deep merge where `other` wins over `self`.
    pub fn with_override(&self, other: &Config) -> Config {
        other.with_fallback(self)
    }

    /// Applies environment overrides: `PFX_A_B_C=val` becomes
    /// `a.b.c = val`. Comma-separated values become arrays.
    pub fn with_env_overrides(&self, prefix: &str) -> Config {
        let mut overrides = Config::new();
        let prefix = format!("{}_", prefix);

        for (key, val) in env::vars() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if rest.is_empty() {
                    continue;
                }
                let path: Vec<String> = rest
                    .split('_')
                    .map(|p| p.to_ascii_lowercase())
                    .collect();
                overrides.set_path(&path, env_value(&val));
            }
        }

        self.with_override(&overrides)
    }

    pub(crate) fn set_path(&mut self, path: &[String], value: ConfigValue) {
        let mut table = &mut self.root;
        for part in &path[..path.len() - 1] {
            let entry = table
                .entry(part.clone())
                .or_insert_with(|| ConfigValue::Table(BTreeMap::new()));
            if !matches!(entry, ConfigValue::Table(_)) {
                *entry = ConfigValue::Table(BTreeMap::new());
            }
            match entry {
                ConfigValue::Table(t) => table = t,
                _ => unreachable!(),
            }
        }
        table.insert(path[path.len() - 1].clone(), value);
    }

    pub(crate) fn set(&mut self, path: &str, value: ConfigValue) {
        let parts: Vec<String> = path.split('.').map(|p| p.to_string()).collect();
        self.set_path(&parts, value);
    }
}

fn wrong_type(path: &str, expected: &'static str, found: &ConfigValue) -> ConfigError {
    ConfigError::WrongType {
        path: path.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn merge_tables(
    base: &BTreeMap<String, ConfigValue>,
    winner: &BTreeMap<String, ConfigValue>,
) -> BTreeMap<String, ConfigValue> {
    let mut out = base.clone();
    for (k, v) in winner {
        match (out.get(k), v) {
            (Some(ConfigValue::Table(b)), ConfigValue::Table(w)) => {
                out.insert(k.clone(), ConfigValue::Table(merge_tables(b, w)));
            }
            _ => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    out
}

fn toml_value(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::Str(s),
        toml::Value::Integer(i) => ConfigValue::Int(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Bool(b),
        toml::Value::Datetime(d) => ConfigValue::Str(d.to_string()),
        toml::Value::Array(a) => ConfigValue::Array(a.into_iter().map(toml_value).collect()),
        toml::Value::Table(t) => {
            ConfigValue::Table(t.into_iter().map(|(k, v)| (k, toml_value(v))).collect())
        }
    }
}

fn json_value(value: serde_json::Value) -> Option<ConfigValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(ConfigValue::Str(s)),
        serde_json::Value::Bool(b) => Some(ConfigValue::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ConfigValue::Int(i))
            } else {
                n.as_f64().map(ConfigValue::Float)
            }
        }
        serde_json::Value::Array(a) => Some(ConfigValue::Array(
            a.into_iter().filter_map(json_value).collect(),
        )),
        serde_json::Value::Object(o) => Some(ConfigValue::Table(
            o.into_iter()
                .filter_map(|(k, v)| json_value(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

fn env_value(raw: &str) -> ConfigValue {
    if raw.contains(',') {
        return ConfigValue::Array(
            raw.split(',')
                .map(|part| scalar_value(part.trim()))
                .collect(),
        );
    }
    scalar_value(raw)
}

fn scalar_value(raw: &str) -> ConfigValue {
    if raw.eq_ignore_ascii_case("true") {
        ConfigValue::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        ConfigValue::Bool(false)
    } else if let Ok(i) = raw.parse::<i64>() {
        ConfigValue::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        ConfigValue::Float(f)
    } else {
        ConfigValue::Str(raw.to_string())
    }
}

fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let err = || ConfigError::InvalidDuration(s.to_string());

    let split = s
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i);

    let (num, unit) = match split {
        Some(i) => s.split_at(i),
        None => (s, "ms"),
    };

    let value: f64 = num.trim().parse().map_err(|_| err())?;
    if value < 0.0 {
        return Err(err());
    }

    let nanos_per = match unit.trim() {
        "ns" => 1.0,
        "us" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        "m" => 60.0 * 1_000_000_000.0,
        "h" => 3_600.0 * 1_000_000_000.0,
        "d" => 86_400.0 * 1_000_000_000.0,
        _ => return Err(err()),
    };

    Ok(Duration::from_nanos((value * nanos_per) as u64))
}

/// Built-in defaults for the runtime's own settings.
pub fn defaults() -> Config {
    let mut cfg = Config::new();
    cfg.set("debug", ConfigValue::Bool(false));
    cfg.set("mailbox.msg_process_limit", ConfigValue::Int(1000));
    cfg.set("scheduler.frequency_millis", ConfigValue::Int(50));
    cfg.set(
        "executor.pool-size",
        ConfigValue::Int(num_cpus::get() as i64),
    );
    cfg.set("executor.queue-capacity", ConfigValue::Int(1024));
    cfg.set("remoting.enabled", ConfigValue::Bool(false));
    cfg.set("remoting.host", ConfigValue::Str("127.0.0.1".into()));
    cfg.set("remoting.port", ConfigValue::Int(2552));
    cfg.set("remoting.stripe-count", ConfigValue::Int(8));
    cfg
}

/// Loads the runtime configuration.
///
/// `movie.toml` contains settings for anything related to the actor
/// framework and its modules. The path is taken from `MOVIE_CONF`,
/// defaulting to `config/movie.toml`; a missing file is not an error.
/// `MOVIE_*` environment variables override file values.
pub fn load_config() -> Config {
    use std::fs;

    let mut cfg = defaults();

    let path = env::var("MOVIE_CONF").unwrap_or_else(|_| "config/movie.toml".into());
    if let Ok(contents) = fs::read_to_string(&path) {
        match Config::from_toml_str(&contents) {
            Ok(file_cfg) => cfg = cfg.with_override(&file_cfg),
            Err(_) => {
                // a malformed file must not prevent startup; defaults win
            }
        }
    }

    cfg.with_env_overrides("MOVIE")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config::from_toml_str(
            r#"
            debug = true

            [remoting]
            enabled = true
            port = 9000
            stripe-count = 4

            [log]
            filter = ["a", "b"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn scalars_and_missing() {
        let cfg = sample();
        assert!(cfg.get_bool("debug").unwrap());
        assert_eq!(cfg.get_int("remoting.port").unwrap(), 9000);
        assert!(matches!(
            cfg.get_int("remoting.nope"),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            cfg.get_str("remoting.port"),
            Err(ConfigError::WrongType { .. })
        ));
        assert_eq!(cfg.get_int_or("remoting.nope", 7), 7);
        assert!(cfg.has_path("remoting.stripe-count"));
        assert!(!cfg.has_path("remoting.stripe-count.x"));
    }

    #[test]
    fn subtree() {
        let cfg = sample();
        let remoting = cfg.get_config("remoting").unwrap();
        assert_eq!(remoting.get_int("port").unwrap(), 9000);
        assert_eq!(remoting.get_int("stripe-count").unwrap(), 4);
    }

    #[test]
    fn fallback_deep_merges_self_wins() {
        let a = Config::from_toml_str("[remoting]\nport = 1\n").unwrap();
        let b = Config::from_toml_str("[remoting]\nport = 2\nhost = \"h\"\n").unwrap();
        let merged = a.with_fallback(&b);
        assert_eq!(merged.get_int("remoting.port").unwrap(), 1);
        assert_eq!(merged.get_str("remoting.host").unwrap(), "h");

        let overridden = a.with_override(&b);
        assert_eq!(overridden.get_int("remoting.port").unwrap(), 2);
    }

    #[test]
    fn durations() {
        let cfg = Config::from_toml_str(
            "a = \"250ms\"\nb = \"2s\"\nc = 100\nd = \"1.5m\"\ne = \"10us\"\n",
        )
        .unwrap();
        assert_eq!(cfg.get_duration("a").unwrap(), Duration::from_millis(250));
        assert_eq!(cfg.get_duration("b").unwrap(), Duration::from_secs(2));
        assert_eq!(cfg.get_duration("c").unwrap(), Duration::from_millis(100));
        assert_eq!(cfg.get_duration("d").unwrap(), Duration::from_secs(90));
        assert_eq!(cfg.get_duration("e").unwrap(), Duration::from_micros(10));
        let bad = Config::from_toml_str("x = \"5parsecs\"\n").unwrap();
        assert!(bad.get_duration("x").is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("MOVIETEST_REMOTING_PORT", "1234");
        env::set_var("MOVIETEST_LOG_FILTER", "x,y,z");
        let cfg = sample().with_env_overrides("MOVIETEST");
        assert_eq!(cfg.get_int("remoting.port").unwrap(), 1234);
        let filter = cfg.get_array("log.filter").unwrap();
        assert_eq!(filter.len(), 3);
        assert_eq!(filter[0], ConfigValue::Str("x".into()));
        env::remove_var("MOVIETEST_REMOTING_PORT");
        env::remove_var("MOVIETEST_LOG_FILTER");
    }

    #[test]
    fn json_loader() {
        let cfg = Config::from_json_str(r#"{"a": {"b": 1, "c": [true, false]}, "d": 1.5}"#).unwrap();
        assert_eq!(cfg.get_int("a.b").unwrap(), 1);
        assert_eq!(cfg.get_float("d").unwrap(), 1.5);
        assert_eq!(cfg.get_array("a.c").unwrap().len(), 2);
    }
}
