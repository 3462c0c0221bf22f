use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// A `key:value` override applied on top of the parameter file.
#[derive(Debug, Clone)]
pub struct Override {
    pub key: String,
    pub value: String,
}

#[derive(Debug)]
pub struct ParseOverrideError(String);

impl fmt::Display for ParseOverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ParseOverrideError {}

impl FromStr for Override {
    type Err = ParseOverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((key, value)) if !key.is_empty() => Ok(Override {
                key: key.trim().to_owned(),
                value: value.trim().to_owned(),
            }),
            _ => Err(ParseOverrideError(format!(
                "Expected key and value separated by `:`, found `{s}`"
            ))),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CommandLineOptions {
    pub parameter_overrides: Vec<Override>,
    #[clap(long)]
    pub parameter_file_path: Option<PathBuf>,
    #[clap(short, parse(from_occurrences))]
    pub verbosity: usize,
    #[clap(long)]
    pub num_worker_threads: Option<usize>,
    #[clap(long)]
    pub output_dir: Option<PathBuf>,
}

impl CommandLineOptions {
    pub fn overrides(&self) -> Vec<(String, String)> {
        self.parameter_overrides
            .iter()
            .map(|o| (o.key.clone(), o.value.clone()))
            .collect()
    }
}
