use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pinharvest_core::parse_prompts;
use pinharvest_engine::{DroppedUnitPolicy, EngineConfig, PermitScope, UnitFailurePolicy};
use serde::{Deserialize, Serialize};

use super::cli::Args;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("no prompts given; pass them as an argument or list them in the config file")]
    NoPrompts,
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitScopeSetting {
    PerRequest,
    PerBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSetting {
    Skip,
    Abort,
}

/// Contents of the optional RON config file. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub prompts: Vec<String>,
    pub count: usize,
    pub output: PathBuf,
    pub consumers: usize,
    pub connections: usize,
    pub drain_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub permit_scope: PermitScopeSetting,
    pub on_unit_failure: FailureSetting,
    pub report_dropped: bool,
    pub search_url: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            prompts: Vec::new(),
            count: 10,
            output: PathBuf::from("."),
            consumers: 3,
            connections: 3,
            drain_timeout_secs: 5,
            max_attempts: 3,
            retry_delay_ms: 500,
            permit_scope: PermitScopeSetting::PerRequest,
            on_unit_failure: FailureSetting::Skip,
            report_dropped: true,
            search_url: None,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything a single invocation needs, after merging file and flags.
#[derive(Debug)]
pub struct RunConfig {
    pub prompts: Vec<String>,
    pub images_per_prompt: usize,
    pub debug: bool,
    pub engine: EngineConfig,
}

impl RunConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Flags win over file values.
    pub fn merge(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let prompts = match args.prompts.as_deref() {
            Some(source) => read_prompt_source(source)?,
            None => parse_prompts(&file.prompts.join("\n")),
        };
        if prompts.is_empty() {
            return Err(ConfigError::NoPrompts);
        }

        let images_per_prompt = args.count.unwrap_or(file.count);
        let consumers = args.consumers.unwrap_or(file.consumers);
        let connections = args.connections.unwrap_or(file.connections);
        for (name, value) in [
            ("count", images_per_prompt),
            ("consumers", consumers),
            ("connections", connections),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if file.drain_timeout_secs == 0 {
            return Err(ConfigError::Zero("drain_timeout_secs"));
        }

        let output = args.output.clone().unwrap_or(file.output);
        let mut engine = EngineConfig::default_with_output(output);
        engine.pipeline.consumer_count = consumers;
        engine.pipeline.connection_limit = connections;
        engine.pipeline.drain_timeout = Duration::from_secs(file.drain_timeout_secs);
        engine.pipeline.unit_failures = match file.on_unit_failure {
            FailureSetting::Skip => UnitFailurePolicy::Skip,
            FailureSetting::Abort => UnitFailurePolicy::Abort,
        };
        let permit_scope = match file.permit_scope {
            PermitScopeSetting::PerRequest => PermitScope::PerRequest,
            PermitScopeSetting::PerBatch => PermitScope::PerBatch,
        };
        let dropped_units = if file.report_dropped {
            DroppedUnitPolicy::Report
        } else {
            DroppedUnitPolicy::Absorb
        };
        for fetch in [&mut engine.page_fetch, &mut engine.image_fetch] {
            fetch.max_attempts = file.max_attempts;
            fetch.retry_delay = Duration::from_millis(file.retry_delay_ms);
            fetch.permit_scope = permit_scope;
            fetch.dropped_units = dropped_units;
        }
        if let Some(search_url) = file.search_url {
            engine.discovery.search_url = search_url;
        }

        Ok(Self {
            prompts,
            images_per_prompt,
            debug: args.debug,
            engine,
        })
    }
}

/// Reads prompts inline, or from a file when the source starts with `@`.
fn read_prompt_source(source: &str) -> Result<Vec<String>, ConfigError> {
    match source.strip_prefix('@') {
        Some(path) => {
            let path = PathBuf::from(path);
            let text = fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read { path, source })?;
            Ok(parse_prompts(&text))
        }
        None => Ok(parse_prompts(source)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn args(prompts: Option<&str>) -> Args {
        Args {
            prompts: prompts.map(str::to_string),
            ..Args::default()
        }
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let config = RunConfig::merge(&args(Some("cats,dogs")), FileConfig::default()).unwrap();
        assert_eq!(config.prompts, vec!["cats", "dogs"]);
        assert_eq!(config.images_per_prompt, 10);
        assert_eq!(config.engine.pipeline.consumer_count, 3);
        assert_eq!(config.engine.pipeline.connection_limit, 3);
        assert_eq!(config.engine.output_root, PathBuf::from("."));
    }

    #[test]
    fn flags_override_the_file() {
        let file = FileConfig {
            prompts: vec!["from file".into()],
            count: 4,
            consumers: 6,
            ..FileConfig::default()
        };
        let cli = Args {
            count: Some(12),
            ..args(Some("from flag"))
        };

        let config = RunConfig::merge(&cli, file).unwrap();
        assert_eq!(config.prompts, vec!["from flag"]);
        assert_eq!(config.images_per_prompt, 12);
        assert_eq!(config.engine.pipeline.consumer_count, 6);
    }

    #[test]
    fn ron_file_fills_in_prompts_and_policies() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.ron");
        fs::write(
            &path,
            r#"(
                prompts: ["Nami One Piece", "cats", "cats"],
                count: 20,
                permit_scope: per_batch,
                on_unit_failure: abort,
                report_dropped: false,
            )"#,
        )
        .unwrap();

        let cli = Args {
            config: Some(path),
            ..Args::default()
        };
        let config = RunConfig::from_args(&cli).unwrap();

        assert_eq!(config.prompts, vec!["Nami One Piece", "cats"]);
        assert_eq!(config.images_per_prompt, 20);
        assert_eq!(config.engine.pipeline.unit_failures, UnitFailurePolicy::Abort);
        assert_eq!(config.engine.image_fetch.permit_scope, PermitScope::PerBatch);
        assert_eq!(config.engine.page_fetch.dropped_units, DroppedUnitPolicy::Absorb);
    }

    #[test]
    fn prompts_can_come_from_a_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompts.txt");
        fs::write(&path, "cats\n\n dogs \n").unwrap();

        let source = format!("@{}", path.display());
        let config = RunConfig::merge(&args(Some(&source)), FileConfig::default()).unwrap();
        assert_eq!(config.prompts, vec!["cats", "dogs"]);
    }

    #[test]
    fn missing_prompts_and_zero_values_are_rejected() {
        assert!(matches!(
            RunConfig::merge(&args(None), FileConfig::default()),
            Err(ConfigError::NoPrompts)
        ));
        assert!(matches!(
            RunConfig::merge(&args(Some(" , ")), FileConfig::default()),
            Err(ConfigError::NoPrompts)
        ));

        let cli = Args {
            consumers: Some(0),
            ..args(Some("cats"))
        };
        assert!(matches!(
            RunConfig::merge(&cli, FileConfig::default()),
            Err(ConfigError::Zero("consumers"))
        ));
    }

    #[test]
    fn zero_drain_timeout_is_rejected() {
        let file = FileConfig {
            drain_timeout_secs: 0,
            ..FileConfig::default()
        };
        assert!(matches!(
            RunConfig::merge(&args(Some("cats")), file),
            Err(ConfigError::Zero("drain_timeout_secs"))
        ));
    }

    #[test]
    fn unreadable_config_is_reported_with_its_path() {
        let err = FileConfig::load(Path::new("/definitely/not/here.ron")).unwrap_err();
        assert!(err.to_string().contains("here.ron"));
    }
}
