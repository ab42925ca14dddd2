//! Settings layered from built-in defaults and `WIKIDUMP_*` environment
//! variables. Command-line flags override both.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

use crate::dump::EXPORT_NAMESPACE;
use crate::markup::{InvalidLevels, LevelSet};

pub const ENV_PREFIX: &str = "WIKIDUMP";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Wiki database name, e.g. `bnwiki`
    pub wiki: String,
    /// Root of the dump mirror
    pub dumps_base_url: String,
    /// Export schema namespace the dump root must declare
    pub export_namespace: String,
    /// Heading levels to keep, in `LevelSet` syntax
    pub levels: String,
    pub max_records: Option<usize>,
    pub batch_size: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// Directory listing that holds the latest dump of this wiki.
    pub fn directory_url(&self) -> String {
        format!("{}/{}/latest/", self.dumps_base_url.trim_end_matches('/'), self.wiki)
    }

    pub fn levels(&self) -> Result<LevelSet, InvalidLevels> {
        self.levels.parse()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("wiki", "bnwiki")?
        .set_default("dumps_base_url", "https://dumps.wikimedia.org")?
        .set_default("export_namespace", EXPORT_NAMESPACE)?
        .set_default("levels", "2-6")?
        .set_default("batch_size", 1)
}
