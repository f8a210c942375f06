//! Reader for the Java `.properties` files TeamCity hands to build agents.

use super::TeamCityError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Points from the build properties file to the configuration properties.
const CONFIGURATION_PROPERTIES_FILE: &str = "teamcity.configuration.properties.file";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildProperties {
    values: HashMap<String, String>,
}

impl BuildProperties {
    /// Loads the build properties and, when referenced, the configuration
    /// properties. Keys from the build properties file take precedence.
    pub fn load(path: &Path) -> Result<Self, TeamCityError> {
        let content = fs::read_to_string(path).map_err(|source| TeamCityError::PropertiesFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut properties = Self::parse(&content);

        if let Some(config_path) = properties.get(CONFIGURATION_PROPERTIES_FILE) {
            let config_path = Path::new(config_path).to_path_buf();
            match fs::read_to_string(&config_path) {
                Ok(content) => {
                    for (key, value) in Self::parse(&content).values {
                        properties.values.entry(key).or_insert(value);
                    }
                }
                Err(e) => tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Could not read configuration properties"
                ),
            }
        }

        Ok(properties)
    }

    pub fn parse(content: &str) -> Self {
        let values = logical_lines(content)
            .iter()
            .map(|line| split_entry(line))
            .collect();
        BuildProperties { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        BuildProperties {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

/// Joins continuation lines and drops comments and blank lines.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut continuing = false;

    for raw in content.lines() {
        let line = raw.trim_start();
        if !continuing && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        let trailing_backslashes = line.chars().rev().take_while(|&c| c == '\\').count();
        if trailing_backslashes % 2 == 1 {
            current.push_str(&line[..line.len() - 1]);
            continuing = true;
        } else {
            current.push_str(line);
            lines.push(std::mem::take(&mut current));
            continuing = false;
        }
    }

    if continuing {
        lines.push(current);
    }
    lines
}

fn split_entry(line: &str) -> (String, String) {
    let mut escaped = false;
    let mut separator = line.len();

    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                separator = idx;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..separator];
    let mut rest = line[separator..].trim_start_matches([' ', '\t', '\x0c']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t', '\x0c']);
    }

    (unescape(key), unescape(rest))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}
