use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// The same field set by more than one file
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<MergeConflictLocation>,
}

#[derive(Debug, Clone)]
pub struct MergeConflictLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// A field whose value is present but unusable
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

/// Failures reading config files before any merging happens
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {}", path.display(), error)]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {}", path.display(), error)]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", path.display(), cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::{Color, Label, Report, ReportKind};

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                let Some(first) = merge_error.conflicts.first() else {
                    continue;
                };

                let mut report = Report::build(
                    ReportKind::Error,
                    (file_id(&first.file_path), first.span.clone()),
                )
                .with_config(ariadne::Config::default().with_color(false))
                .with_message(format!(
                    "Merge conflict in field '{}'",
                    merge_error.field_path
                ))
                .with_note(&merge_error.message);

                for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
                    let label_msg = if idx == 0 {
                        "first definition here"
                    } else {
                        "conflicts with this definition"
                    };

                    report = report.with_label(
                        Label::new((file_id(&conflict.file_path), conflict.span.clone()))
                            .with_message(label_msg)
                            .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
                    );
                }

                let sources = ariadne::sources(
                    merge_error
                        .conflicts
                        .iter()
                        .map(|c| (file_id(&c.file_path), c.content.clone())),
                );

                if report.finish().write(sources, &mut output).is_err() {
                    // Fall back to a plain line if the span can't be rendered
                    let msg = format!(
                        "Merge conflict in field '{}': {}\n",
                        merge_error.field_path, merge_error.message
                    );
                    output.extend_from_slice(msg.as_bytes());
                }
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let mut msg = format!(
                    "Validation error in '{}': {}",
                    validation_error.field_path, validation_error.message
                );
                if let Some(source) = &validation_error.source {
                    msg.push_str(&format!(" ({})", source.file_path.display()));
                }
                msg.push('\n');
                output.extend_from_slice(msg.as_bytes());
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

fn file_id(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}
