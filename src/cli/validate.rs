use std::path::PathBuf;

use atlas::{CompiledMatrix, Config, MatrixCompiler};
use clap::Parser;
use tracing::instrument;

use super::terminal::{Tone, mark, paint};

#[derive(Debug, Parser)]
pub struct Validate {
    /// Path to the matrix definition [default: from config, or data/matrix.yaml]
    #[arg(long, short)]
    matrix: Option<PathBuf>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    format: OutputFormat,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

/// Everything a validation run found.
#[derive(Debug)]
struct Findings {
    compiled: CompiledMatrix,
    unreferenced: Vec<PathBuf>,
    /// Whether unreferenced sources count as issues.
    unreferenced_are_issues: bool,
}

impl Findings {
    fn issue_count(&self) -> usize {
        let unreferenced = if self.unreferenced_are_issues {
            self.unreferenced.len()
        } else {
            0
        };
        self.compiled.report().violations.len() + unreferenced
    }
}

impl Validate {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, mut config: Config) -> anyhow::Result<()> {
        if let Some(matrix) = self.matrix.clone() {
            config.set_matrix(matrix);
        }

        let compiled = MatrixCompiler::from_config(&config).compile()?;
        let findings = Findings {
            unreferenced: compiled.unreferenced_sources(),
            compiled,
            unreferenced_are_issues: !config.allow_unreferenced,
        };

        match self.format {
            OutputFormat::Table => self.output_table(&findings),
            OutputFormat::Json => Self::output_json(&findings)?,
            OutputFormat::Summary => Self::output_summary(&findings),
        }

        if findings.issue_count() > 0 {
            std::process::exit(2);
        }

        Ok(())
    }

    fn output_table(&self, findings: &Findings) {
        let report = findings.compiled.report();

        if !self.quiet {
            println!("Validating {}...\n", findings.compiled.id());
        }

        if report.is_clean() {
            if !self.quiet {
                println!(
                    "{} Schema:   {} objects, all valid",
                    mark(true),
                    report.objects_checked
                );
            }
        } else {
            println!(
                "{} Schema:   {}",
                mark(false),
                paint(
                    format_args!(
                        "{} violations in {} objects",
                        report.violations.len(),
                        report.objects_with_violations()
                    ),
                    Tone::Bad
                )
            );
            for violation in &report.violations {
                println!(
                    "  {} {}: {}",
                    paint(
                        format_args!("{} [{}]", violation.object_id, violation.object_type),
                        Tone::Quiet
                    ),
                    violation.field,
                    violation.reason
                );
            }
        }

        if findings.unreferenced.is_empty() {
            if !self.quiet {
                println!(
                    "{} Sources:  {} files, all included",
                    mark(true),
                    findings.compiled.files().len()
                );
            }
        } else if findings.unreferenced_are_issues || !self.quiet {
            let opening = if findings.unreferenced_are_issues {
                mark(false)
            } else {
                paint("!", Tone::Quiet)
            };
            println!(
                "{opening} Sources:  {}",
                paint(
                    format_args!("{} files not reached by any include", findings.unreferenced.len()),
                    Tone::Bad
                )
            );
            for path in &findings.unreferenced {
                println!("  {}", paint(path.display(), Tone::Quiet));
            }
        }

        if self.quiet {
            return;
        }
        let total = findings.issue_count();
        if total == 0 {
            println!("\n{}", paint("Matrix is valid (0 issues)", Tone::Good));
        } else {
            println!("\n{}", paint(format_args!("Summary: {total} issues found"), Tone::Bad));
        }
    }

    fn output_json(findings: &Findings) -> anyhow::Result<()> {
        use serde_json::json;

        let total = findings.issue_count();
        let output = json!({
            "matrix": findings.compiled.id(),
            "status": if total == 0 { "valid" } else { "issues_found" },
            "report": findings.compiled.report(),
            "unreferenced": findings.unreferenced,
            "summary": {
                "total_issues": total,
                "objects_checked": findings.compiled.report().objects_checked,
                "files_loaded": findings.compiled.files().len(),
            }
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_summary(findings: &Findings) {
        println!(
            "violations={} unreferenced={} objects={}",
            findings.compiled.report().violations.len(),
            findings.unreferenced.len(),
            findings.compiled.report().objects_checked
        );
    }
}
