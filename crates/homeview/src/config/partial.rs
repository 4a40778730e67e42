use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use toml::Spanned;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::LoadError;
use super::diagnostics::MergeConflictLocation;
use super::diagnostics::MergeError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;
use super::LogLevel;
use crate::measurements::RowOrder;
use crate::pagination::PageSizeOption;

/// One config file as written, every field optional and span-tracked.
#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub backend: Option<PartialBackendConfig>,
    pub measurements: Option<PartialMeasurementsConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// File each merged field was taken from, keyed by field path
    #[serde(skip)]
    pub field_sources: HashMap<String, SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialBackendConfig {
    pub base_url: Option<Spanned<String>>,
    pub timeout_secs: Option<Spanned<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialMeasurementsConfig {
    pub page_size: Option<Spanned<PageSizeOption>>,
    pub row_order: Option<Spanned<RowOrder>>,
    pub start: Option<Spanned<String>>,
    pub end: Option<Spanned<String>>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns every loaded config in order, imports before the file that
    /// imports them.
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        for import in &config.imports {
            let import_path = PathBuf::from(import);

            // Relative imports resolve against the importing file's directory
            let resolved = if import_path.is_absolute() {
                import_path
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path)
            };

            Self::load_recursive(&resolved, visited, configs)?;
        }

        configs.push(config);

        // Siblings may import the same file; only ancestors form a cycle
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.logging.is_none()
            && self.backend.is_none()
            && self.measurements.is_none()
    }

    /// Merge multiple partial configs together
    ///
    /// First-wins: the first file to set a field keeps it. Every later
    /// definition is reported as a conflict, and merging carries on so all
    /// conflicts surface at once.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger::default();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.iter().cloned());

            let source = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger.diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source.file_path.clone(),
                }));
            }

            if let Some(logging) = config.logging {
                let target = result.logging.get_or_insert_with(Default::default);
                merger.take("logging.level", &mut target.level, logging.level, &source);

                if let Some(overrides) = logging.overrides {
                    let target_overrides = target.overrides.get_or_insert_with(HashMap::new);
                    for (key, value) in overrides {
                        let path = format!("logging.overrides.{}", key);
                        let mut slot = target_overrides.remove(&key);
                        merger.take(&path, &mut slot, Some(value), &source);
                        if let Some(kept) = slot {
                            target_overrides.insert(key, kept);
                        }
                    }
                }
            }

            if let Some(backend) = config.backend {
                let target = result.backend.get_or_insert_with(Default::default);
                merger.take("backend.base_url", &mut target.base_url, backend.base_url, &source);
                merger.take(
                    "backend.timeout_secs",
                    &mut target.timeout_secs,
                    backend.timeout_secs,
                    &source,
                );
            }

            if let Some(measurements) = config.measurements {
                let target = result.measurements.get_or_insert_with(Default::default);
                merger.take(
                    "measurements.page_size",
                    &mut target.page_size,
                    measurements.page_size,
                    &source,
                );
                merger.take(
                    "measurements.row_order",
                    &mut target.row_order,
                    measurements.row_order,
                    &source,
                );
                merger.take("measurements.start", &mut target.start, measurements.start, &source);
                merger.take("measurements.end", &mut target.end, measurements.end, &source);
            }

            // Validation messages point at the first file that set anything
            if result.source.is_none() {
                result.source = config.source;
            }
        }

        result.imports = imports;
        result.field_sources = merger.sources;

        (result, merger.diagnostics)
    }
}

/// Tracks where each field was first defined while merging.
#[derive(Default)]
struct Merger {
    first_defined: HashMap<String, MergeConflictLocation>,
    sources: HashMap<String, SourceInfo>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    fn take<T>(
        &mut self,
        field_path: &str,
        slot: &mut Option<Spanned<T>>,
        incoming: Option<Spanned<T>>,
        source: &SourceInfo,
    ) {
        let Some(incoming) = incoming else {
            return;
        };

        let location = MergeConflictLocation {
            file_path: source.file_path.clone(),
            span: incoming.span(),
            content: source.content.clone(),
        };

        if let Some(previous) = self.first_defined.get(field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![previous.clone(), location],
            })));
        } else {
            *slot = Some(incoming);
            self.first_defined.insert(field_path.to_string(), location);
            self.sources.insert(field_path.to_string(), source.clone());
        }
    }
}
