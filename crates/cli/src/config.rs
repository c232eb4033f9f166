//! Configuration loading from datalens.toml.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use runtime::charts::PiePolicy;
use runtime::prompts::DEFAULT_AGENT_NAME;
use runtime::providers::{DEFAULT_MODEL, OPENAI_API_BASE};
use runtime::tools::DEFAULT_CLOSE_TIMEOUT;
use runtime::{DEFAULT_MAX_TOOL_ROUNDS, ExtractOptions, LaunchDescriptor, SessionSettings};
use serde::Deserialize;

/// File looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = "datalens.toml";

/// Environment variable consulted when `model.api_key` is unset.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Top-level configuration. Every section may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    /// Tool processes to launch. Empty means the built-in pair.
    pub tools: Vec<ToolConfig>,
    pub requests: RequestsConfig,
    pub charts: ChartsConfig,
    /// Where the transcript database lives.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_tool_rounds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            api_key: None,
            max_tokens: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
        }
    }
}

/// One `[[tools]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Values may reference the process environment as `${VAR}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub connect_timeout_secs: Option<u64>,
    pub close_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    /// Per-request deadline, queueing included. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    pub pie_policy: PiePolicy,
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig {
            name: "mongodb".to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "mongodb-mcp-server@latest".to_string()],
            env: BTreeMap::from([(
                "MDB_MCP_CONNECTION_STRING".to_string(),
                "${MDB_MCP_CONNECTION_STRING}".to_string(),
            )]),
            connect_timeout_secs: Some(120),
            close_timeout_secs: None,
        },
        ToolConfig {
            name: "chart".to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@antv/mcp-server-chart".to_string()],
            env: BTreeMap::new(),
            connect_timeout_secs: Some(60),
            close_timeout_secs: None,
        },
    ]
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero durations; a zero deadline would fail every request.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.requests.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "requests.timeout_secs must be at least 1".into(),
            ));
        }
        for tool in &self.tools {
            for (field, secs) in [
                ("connect_timeout_secs", tool.connect_timeout_secs),
                ("close_timeout_secs", tool.close_timeout_secs),
            ] {
                if secs == Some(0) {
                    return Err(ConfigError::Invalid(format!(
                        "tool '{}': {field} must be at least 1",
                        tool.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load `path` if given, else `datalens.toml` if present, else defaults.
    ///
    /// Returns the file actually read alongside the config.
    pub fn discover(path: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = path {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok((Self::load(&local)?, Some(local)));
        }
        Ok((Self::default(), None))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The configured tools, or the built-in MongoDB and chart servers.
    pub fn tools(&self) -> Vec<ToolConfig> {
        if self.tools.is_empty() {
            default_tools()
        } else {
            self.tools.clone()
        }
    }

    /// Launch descriptors with `${VAR}` references resolved through `lookup`.
    pub fn descriptors(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<LaunchDescriptor>, ConfigError> {
        let mut descriptors = Vec::new();
        for tool in self.tools() {
            if tool.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tool '{}' has an empty command",
                    tool.name
                )));
            }
            if descriptors
                .iter()
                .any(|d: &LaunchDescriptor| d.name == tool.name)
            {
                return Err(ConfigError::Invalid(format!(
                    "tool '{}' is configured twice",
                    tool.name
                )));
            }

            let mut descriptor = LaunchDescriptor::new(&tool.name, &tool.command)
                .args(tool.args.iter().cloned())
                .close_timeout(
                    tool.close_timeout_secs
                        .map_or(DEFAULT_CLOSE_TIMEOUT, Duration::from_secs),
                );
            if let Some(secs) = tool.connect_timeout_secs {
                descriptor = descriptor.connect_timeout(Duration::from_secs(secs));
            }
            for (key, value) in &tool.env {
                let value = interpolate(value, &lookup).map_err(|var| ConfigError::MissingEnv {
                    tool: tool.name.clone(),
                    var,
                })?;
                descriptor = descriptor.env(key, value);
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    /// `model.api_key`, falling back to `OPENAI_API_KEY`.
    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        self.model
            .api_key
            .clone()
            .or_else(|| lookup(API_KEY_VAR))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            name: self.agent.name.clone(),
            max_tool_rounds: self.model.max_tool_rounds,
            request_deadline: self.requests.timeout_secs.map(Duration::from_secs),
            extract: ExtractOptions {
                pie_policy: self.charts.pie_policy,
            },
            ..SessionSettings::default()
        }
    }
}

/// Replace every `${VAR}` in `value`. Returns the first unresolved name.
fn interpolate(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let var = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        out.push_str(&lookup(var).ok_or_else(|| var.to_string())?);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("tool '{tool}' needs environment variable {var}")]
    MissingEnv { tool: String, var: String },

    #[error("no API key: set model.api_key or {API_KEY_VAR}")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.model.name, DEFAULT_MODEL);
        assert_eq!(config.agent.name, DEFAULT_AGENT_NAME);
        assert_eq!(config.charts.pie_policy, PiePolicy::Annotate);

        let names: Vec<_> = config.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["mongodb", "chart"]);

        let settings = config.session_settings();
        assert_eq!(settings.request_deadline, None);
        assert_eq!(settings.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            data_dir = "/var/lib/datalens"

            [server]
            port = 9000

            [model]
            name = "gpt-4o"
            max_tool_rounds = 8

            [requests]
            timeout_secs = 90

            [charts]
            pie_policy = "clamp"

            [[tools]]
            name = "warehouse"
            command = "warehouse-mcp"
            args = ["--read-only"]
            close_timeout_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/var/lib/datalens")));

        let settings = config.session_settings();
        assert_eq!(settings.max_tool_rounds, 8);
        assert_eq!(settings.request_deadline, Some(Duration::from_secs(90)));
        assert_eq!(settings.extract.pie_policy, PiePolicy::Clamp);

        let descriptors = config.descriptors(env(&[])).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].args, ["--read-only"]);
        assert_eq!(descriptors[0].close_timeout, Duration::from_secs(3));
    }

    #[test]
    fn env_references_are_resolved() {
        let config = Config::default();

        let descriptors = config
            .descriptors(env(&[("MDB_MCP_CONNECTION_STRING", "mongodb://db:27017")]))
            .unwrap();

        let mongodb = &descriptors[0];
        assert_eq!(mongodb.command, "npx");
        assert_eq!(mongodb.connect_timeout, Duration::from_secs(120));
        assert_eq!(
            mongodb.env.get("MDB_MCP_CONNECTION_STRING").map(String::as_str),
            Some("mongodb://db:27017")
        );
        assert_eq!(descriptors[1].connect_timeout, Duration::from_secs(60));
    }

    #[test]
    fn unresolved_env_reference_is_an_error() {
        let err = Config::default().descriptors(env(&[])).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::MissingEnv { ref tool, ref var }
                if tool == "mongodb" && var == "MDB_MCP_CONNECTION_STRING"
        ));
    }

    #[test]
    fn interpolation_keeps_surrounding_text() {
        let lookup = env(&[("USER", "ana"), ("PASS", "s3cret")]);

        assert_eq!(
            interpolate("mongodb://${USER}:${PASS}@db", &lookup).unwrap(),
            "mongodb://ana:s3cret@db"
        );
        assert_eq!(interpolate("plain", &lookup).unwrap(), "plain");
        assert_eq!(interpolate("${unclosed", &lookup).unwrap(), "${unclosed");
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let config = Config::parse(
            r#"
            [[tools]]
            name = "db"
            command = "a"

            [[tools]]
            name = "db"
            command = "b"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.descriptors(env(&[])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let request = Config::parse("[requests]\ntimeout_secs = 0");
        assert!(matches!(request, Err(ConfigError::Invalid(ref m)) if m.contains("timeout_secs")));

        let connect = Config::parse(
            r#"
            [[tools]]
            name = "db"
            command = "db-mcp"
            connect_timeout_secs = 0
            "#,
        );
        assert!(matches!(connect, Err(ConfigError::Invalid(ref m)) if m.contains("'db'")));

        let close = Config::parse(
            r#"
            [[tools]]
            name = "db"
            command = "db-mcp"
            close_timeout_secs = 0
            "#,
        );
        assert!(matches!(close, Err(ConfigError::Invalid(ref m)) if m.contains("close_timeout_secs")));
    }

    #[test]
    fn api_key_falls_back_to_environment() {
        let mut config = Config::default();
        assert!(matches!(
            config.api_key(env(&[])),
            Err(ConfigError::MissingApiKey)
        ));
        assert_eq!(
            config.api_key(env(&[(API_KEY_VAR, "sk-env")])).unwrap(),
            "sk-env"
        );

        config.model.api_key = Some("sk-file".into());
        assert_eq!(
            config.api_key(env(&[(API_KEY_VAR, "sk-env")])).unwrap(),
            "sk-file"
        );
    }
}
