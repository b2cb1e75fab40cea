use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{bail, Result};
use fn_error_context::context;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub struct Options {
    #[structopt(
        value_name = "CONFIG_FILE",
        help = "Path to the config file",
        parse(from_os_str)
    )]
    config: PathBuf,
}

#[context("failed to parse config from `{}`", options.config.display())]
pub fn parse(options: &Options) -> Result<Config> {
    from_reader(BufReader::new(File::open(&options.config)?))
}

fn from_reader<R: Read>(reader: R) -> Result<Config> {
    let config: Config = serde_yaml::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct Route {
    pub path: Pattern,
    #[serde(with = "http_serde::uri")]
    pub uri: http::Uri,
}

#[derive(Debug)]
pub struct Pattern {
    regex: Regex,
}

impl Config {
    fn validate(&self) -> Result<()> {
        for route in &self.routes {
            route.validate()?;
        }
        Ok(())
    }
}

impl Route {
    #[context("error in route `{}`", self.path)]
    fn validate(&self) -> Result<()> {
        if self.uri.scheme().is_none() {
            bail!("uri `{}` has no scheme", self.uri);
        }
        if self.uri.authority().is_none() {
            bail!("uri `{}` has no authority", self.uri);
        }
        Ok(())
    }
}

impl Pattern {
    pub fn into_regex(self) -> Regex {
        self.regex
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.regex.as_str().fmt(f)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        let regex = Regex::new(&pattern).map_err(de::Error::custom)?;
        Ok(Pattern { regex })
    }
}
