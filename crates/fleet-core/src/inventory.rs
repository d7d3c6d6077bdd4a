//! Target inventory: scope codes, snapshot files, and name filters.
//!
//! Live directory discovery is not done here. Targets come either from an
//! explicit host list or from a snapshot file of plain delimited records:
//!
//! ```text
//! # name,scope,roles...
//! web-01.lon.example.net,LON,frontend
//! vault-01.lon.example.net,LON,crypto
//! jump.example.net
//! ```
//!
//! A record without a scope column belongs to every scope. Columns after the
//! scope are role tags, selectable through [`TargetFilter::with_roles`].

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FleetError, Result};
use crate::io::atomic_write;
use crate::types::Target;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Validated site / region code. Stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        let valid = (2..=8).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(FleetError::InvalidScope(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Scope {
    type Error = FleetError;

    fn try_from(s: String) -> Result<Self> {
        Scope::parse(&s)
    }
}

impl From<Scope> for String {
    fn from(s: Scope) -> Self {
        s.0
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Discovery(format!("cannot read inventory {}: {e}", path.display()))
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let mut records: Vec<Record> = Vec::new();
        for (idx, raw) in data.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            let name = fields.next().unwrap_or_default();
            if records.is_empty() && name.eq_ignore_ascii_case("name") {
                continue;
            }
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(FleetError::InventoryRecord {
                    line: idx + 1,
                    reason: format!("invalid host name '{name}'"),
                });
            }
            let scope = fields
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let roles = fields.filter(|s| !s.is_empty()).map(str::to_string).collect();
            records.push(Record {
                name: name.to_string(),
                scope,
                roles,
            });
        }
        Ok(Self { records })
    }

    /// Records in `scope`, plus scope-less records.
    pub fn in_scope<'a>(&'a self, scope: &'a Scope) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .iter()
            .filter(move |r| r.scope.as_deref().map_or(true, |s| scope.matches(s)))
    }

    pub fn targets(&self, scope: &Scope) -> Vec<Target> {
        self.in_scope(scope)
            .map(|r| Target::new(r.name.clone()))
            .collect()
    }

    /// Write `targets` as a snapshot tagged with `scope`.
    pub fn write(path: &Path, scope: &Scope, targets: &[Target]) -> Result<()> {
        let mut out = String::from("name,scope\n");
        for t in targets {
            out.push_str(t.name());
            out.push(',');
            out.push_str(scope.as_str());
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// TargetFilter
// ---------------------------------------------------------------------------

/// Case-insensitive include / exclude name patterns. Exclude wins.
///
/// Optional role tags narrow snapshot records further: a record is kept when
/// it carries any of them.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    roles: Vec<String>,
}

impl TargetFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            roles: Vec::new(),
        })
    }

    pub fn with_roles(mut self, roles: &[String]) -> Self {
        self.roles = roles
            .iter()
            .map(|r| r.trim().to_ascii_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    pub fn selects_roles(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn allows_roles(&self, roles: &[String]) -> bool {
        self.roles.is_empty()
            || roles
                .iter()
                .any(|r| self.roles.iter().any(|want| want.eq_ignore_ascii_case(r)))
    }

    pub fn allows(&self, target: &Target) -> bool {
        let name = target.name();
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(name));
        included && !self.exclude.iter().any(|r| r.is_match(name))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|source| FleetError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum InventorySource {
    /// Explicit host names; scope is validated but not used for matching.
    Hosts(Vec<String>),
    Snapshot(PathBuf),
}

/// Resolve, filter, sort, and de-duplicate the targets for `scope`.
///
/// An empty result is not an error; callers report it as a notice.
pub fn resolve(source: &InventorySource, scope: &Scope, filter: &TargetFilter) -> Result<Vec<Target>> {
    let candidates: Vec<Target> = match source {
        InventorySource::Hosts(_) if filter.selects_roles() => {
            return Err(FleetError::RolesUnavailable);
        }
        InventorySource::Hosts(hosts) => hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(Target::from)
            .collect(),
        InventorySource::Snapshot(path) => Snapshot::load(path)?
            .in_scope(scope)
            .filter(|r| filter.allows_roles(&r.roles))
            .map(|r| Target::new(r.name.clone()))
            .collect(),
    };

    let selected: BTreeSet<Target> = candidates
        .into_iter()
        .filter(|t| filter.allows(t))
        .collect();
    tracing::debug!(%scope, count = selected.len(), "inventory resolved");
    Ok(selected.into_iter().collect())
}
