//! Baseline configlets
//!
//! Day-1 templates: structured table entries with `{{variable}}`
//! placeholders in keys and values, rendered against a variable map at
//! apply time.

use netforge_common::configdb::{FieldValues, Table};
use netforge_common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"));

/// A baseline template: table -> key -> fields, all possibly templated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configlet {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entries: BTreeMap<String, BTreeMap<String, FieldValues>>,
}

fn substitute(input: &str, vars: &BTreeMap<String, String>, configlet: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in VAR_RE.captures_iter(input) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = &captures[1];
        let value = vars.get(name).ok_or_else(|| {
            Error::validation(format!(
                "configlet {}: variable {:?} not supplied",
                configlet, name
            ))
        })?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

impl Configlet {
    /// Every variable the template references.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut scan = |s: &str| {
            for captures in VAR_RE.captures_iter(s) {
                out.insert(captures[1].to_string());
            }
        };
        for (_, entries) in &self.entries {
            for (key, fields) in entries {
                scan(key);
                for (name, value) in fields {
                    scan(name);
                    scan(value);
                }
            }
        }
        out
    }

    /// Render the template into concrete entries.
    ///
    /// Fails on variables missing from `vars` and on table names outside
    /// the ConfigDB schema.
    pub fn render(
        &self,
        vars: &BTreeMap<String, String>,
    ) -> Result<Vec<(Table, String, FieldValues)>> {
        let mut out = Vec::new();
        for (table_name, entries) in &self.entries {
            let table: Table = table_name.parse().map_err(|_| {
                Error::validation(format!(
                    "configlet {}: unknown table {:?}",
                    self.name, table_name
                ))
            })?;
            for (key, fields) in entries {
                let key = substitute(key, vars, &self.name)?;
                let mut rendered = FieldValues::new();
                for (name, value) in fields {
                    rendered.insert(
                        substitute(name, vars, &self.name)?,
                        substitute(value, vars, &self.name)?,
                    );
                }
                out.push((table, key, rendered));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Configlet {
        serde_json::from_str(
            r#"{
                "name": "mgmt-baseline",
                "entries": {
                    "DEVICE_METADATA": {
                        "localhost": {
                            "hostname": "{{hostname}}",
                            "bgp_asn": "{{asn}}"
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn variables_are_discovered() {
        let vars = sample().variables();
        assert!(vars.contains("hostname"));
        assert!(vars.contains("asn"));
    }

    #[test]
    fn render_substitutes_everywhere() {
        let mut vars = BTreeMap::new();
        vars.insert("hostname".to_string(), "leaf1".to_string());
        vars.insert("asn".to_string(), "65001".to_string());
        let entries = sample().render(&vars).unwrap();
        assert_eq!(entries.len(), 1);
        let (table, key, fields) = &entries[0];
        assert_eq!(*table, Table::DeviceMetadata);
        assert_eq!(key, "localhost");
        assert_eq!(fields.get("hostname").unwrap(), "leaf1");
        assert_eq!(fields.get("bgp_asn").unwrap(), "65001");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = sample().render(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
