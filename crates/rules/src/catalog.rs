//! In-memory rule catalog.
//!
//! Loads rule documents from YAML strings or a directory, compiles each
//! definition and serves the compiled set to the evaluator. Loading is
//! lenient: an invalid rule is skipped with a warning and a report entry,
//! never aborting the scan. Snapshot import is the strict counterpart,
//! where every definition must compile.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RuleError;
use crate::rule::Rule;
use crate::schema::{RuleDefinition, RuleEnvelope};

// ── Load report ─────────────────────────────────────────────────────

/// Outcome of a lenient load pass: how many rules landed, which were skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRule>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn merge(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.skipped.extend(other.skipped);
    }
}

/// One rule (or whole document) that did not make it into the catalog.
#[derive(Debug, Clone)]
pub struct SkippedRule {
    /// Where the rule came from: a file name or an inline label, with the
    /// rule id appended when it is known.
    pub source: String,
    pub reason: String,
}

// ── Catalog statistics ──────────────────────────────────────────────

/// Counts exposed for hosts and dashboards. Keyed by display name so the
/// breakdowns serialize with stable, human-readable keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: usize,
    pub enabled: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

// ── Rule catalog ────────────────────────────────────────────────────

/// The compiled rule set plus the raw definitions it was built from.
///
/// Raw definitions are kept alongside the compiled rules (same order, same
/// length) so the catalog can be exported and rebuilt exactly.
#[derive(Debug, Default)]
pub struct RuleCatalog {
    raw: Vec<RuleDefinition>,
    compiled: Vec<Rule>,
    ids: HashSet<String>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from exported definitions. Strict: any definition
    /// that fails to compile (or duplicates an id) fails the whole import,
    /// since exported state is expected to be exactly re-loadable.
    pub fn from_definitions(defs: Vec<RuleDefinition>) -> Result<Self, RuleError> {
        let mut catalog = Self::new();
        for def in defs {
            catalog.add(def)?;
        }
        Ok(catalog)
    }

    /// Compile and insert one definition. Rejects duplicates by id.
    pub fn add(&mut self, def: RuleDefinition) -> Result<(), RuleError> {
        if self.ids.contains(&def.id) {
            return Err(RuleError::DuplicateId(def.id));
        }
        let rule = def.compile()?;
        self.ids.insert(def.id.clone());
        self.raw.push(def);
        self.compiled.push(rule);
        Ok(())
    }

    /// Parse one YAML document and load its rules leniently.
    ///
    /// A document that fails envelope parsing is reported as one skip; a
    /// definition that fails to compile is reported individually. `source`
    /// labels the report entries (file name, or something like `"<inline>"`).
    pub fn load_str(&mut self, source: &str, yaml: &str) -> LoadReport {
        let mut report = LoadReport::default();

        let envelope: RuleEnvelope = match serde_yaml::from_str(yaml) {
            Ok(env) => env,
            Err(e) => {
                warn!(source, error = %e, "failed to parse rule document");
                report.skipped.push(SkippedRule {
                    source: source.to_string(),
                    reason: format!("document parse error: {e}"),
                });
                return report;
            }
        };

        let document = match envelope.parse_full() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(source, error = %e, "failed to parse rule document");
                report.skipped.push(SkippedRule {
                    source: source.to_string(),
                    reason: e.to_string(),
                });
                return report;
            }
        };

        for def in document.definitions() {
            let rule_id = def.id.clone();
            match self.add(def) {
                Ok(()) => {
                    info!(rule_id = %rule_id, source, "loaded rule");
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(rule_id = %rule_id, source, error = %e, "skipping invalid rule");
                    report.skipped.push(SkippedRule {
                        source: format!("{source}#{rule_id}"),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Scan a directory for `*.yml` / `*.yaml` files and load them all.
    ///
    /// Dotfiles, subdirectories and other extensions are ignored. Files are
    /// visited in sorted order so load outcomes are deterministic. Only the
    /// directory read itself can fail; per-file problems end up in the report.
    pub fn load_dir(&mut self, dir: &Path) -> Result<LoadReport, RuleError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                if path.is_dir() {
                    return false;
                }
                let dotfile = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(true);
                let yaml = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e == "yml" || e == "yaml")
                    .unwrap_or(false);
                !dotfile && yaml
            })
            .collect();
        paths.sort();

        let mut report = LoadReport::default();
        for path in paths {
            let source = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unnamed>")
                .to_string();
            match fs::read_to_string(&path) {
                Ok(contents) => report.merge(self.load_str(&source, &contents)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read rule file");
                    report.skipped.push(SkippedRule {
                        source,
                        reason: format!("IO error: {e}"),
                    });
                }
            }
        }

        info!(
            dir = %dir.display(),
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "rule directory scan complete"
        );
        Ok(report)
    }

    // ── Access ──────────────────────────────────────────────────────

    pub fn rules(&self) -> &[Rule] {
        &self.compiled
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &Rule> {
        self.compiled.iter().filter(|r| r.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.compiled.iter().find(|r| r.id == id)
    }

    /// Raw definitions in insertion order, for export.
    pub fn definitions(&self) -> &[RuleDefinition] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        let mut enabled = 0usize;

        for rule in &self.compiled {
            *by_kind.entry(rule.kind.to_string()).or_default() += 1;
            *by_severity.entry(rule.severity.to_string()).or_default() += 1;
            if rule.enabled {
                enabled += 1;
            }
        }

        CatalogStats {
            total: self.compiled.len(),
            enabled,
            by_kind,
            by_severity,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
