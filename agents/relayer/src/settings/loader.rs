use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use eyre::{bail, Context, Result};
use serde::de::DeserializeOwned;

const ENV_PREFIX: &str = "GASLESS";

/// Deserialize a settings object from `./config`, `CONFIG_FILES` and the
/// process environment.
pub(crate) fn load_settings<T>() -> Result<T>
where
    T: DeserializeOwned + Debug,
{
    let config_files: Vec<String> = env::var("CONFIG_FILES")
        .map(|s| s.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();
    load_settings_from(Path::new("./config"), &config_files, None)
}

/// Deserialize a settings object from every json file in `config_dir` (if it
/// exists), then `config_files` in order, then environment variables. `env`
/// replaces the process environment when given.
pub fn load_settings_from<T>(
    config_dir: &Path,
    config_files: &[String],
    env: Option<HashMap<String, String>>,
) -> Result<T>
where
    T: DeserializeOwned + Debug,
{
    let mut loaded_sources = vec![];
    let mut builder = Config::builder();

    if config_dir.is_dir() {
        let mut base_files = config_dir
            .read_dir()
            .with_context(|| format!("Failed to open config directory {config_dir:?}"))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<PathBuf>, _>>()
            .context("Failed to list config directory")?;
        base_files.sort();

        for path in base_files {
            if path.is_file() && path.extension() == Some("json".as_ref()) {
                loaded_sources.push(format!("{path:?}"));
                builder = builder.add_source(File::from(path));
            }
        }
    }

    for path in config_files.iter().filter(|path| !path.is_empty()) {
        let p = PathBuf::from(path);
        if p.is_file() {
            if p.extension() == Some("json".as_ref()) {
                loaded_sources.push(format!("{p:?}"));
                builder = builder.add_source(File::from(p));
            } else {
                bail!("Provided config path via CONFIG_FILES is of an unsupported type ({p:?})");
            }
        } else if !p.exists() {
            bail!("Provided config path via CONFIG_FILES does not exist ({p:?})");
        } else {
            bail!("Provided config path via CONFIG_FILES is not a file ({p:?})");
        }
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to load config sources")?;

    config.try_deserialize::<T>().or_else(|err| {
        let mut err = Err(err).context("Config deserialization error");
        for source in &loaded_sources {
            err = err.with_context(|| format!("Config loaded: {source}"));
        }
        err
    })
}
