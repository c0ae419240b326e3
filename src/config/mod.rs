use std::env;

use log::debug;

pub const DEFAULT_PROMPT: &str = "@> ";

#[derive(Clone, Debug)]
pub struct Config {
    pub prompt: String,
    pub color: bool,
    pub history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: DEFAULT_PROMPT.to_string(),
            color: true,
            history: true,
        }
    }
}

impl Config {
    /// Reads `JOBSH_PROMPT`, `JOBSH_COLOR`, `JOBSH_HISTORY` and `NO_COLOR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(prompt) = lookup("JOBSH_PROMPT") {
            config.prompt = prompt;
        }
        if let Some(value) = lookup("JOBSH_COLOR") {
            config.color = flag(&value);
        }
        if lookup("NO_COLOR").map_or(false, |v| !v.is_empty()) {
            config.color = false;
        }
        if let Some(value) = lookup("JOBSH_HISTORY") {
            config.history = flag(&value);
        }

        debug!("Loaded config: {:?}", config);
        config
    }
}

fn flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
