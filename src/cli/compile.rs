use std::path::PathBuf;

use atlas::{CompileError, Config, MatrixCompiler};
use clap::Parser;
use tracing::instrument;

use super::terminal::{Tone, paint};

#[derive(Debug, Default, Parser)]
pub struct Compile {
    /// Path to the matrix definition [default: from config, or data/matrix.yaml]
    #[arg(long, short)]
    matrix: Option<PathBuf>,

    /// Directory to write artifacts to [default: from config, or dist]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write artifacts even if validation finds violations
    #[arg(long)]
    skip_validation: bool,
}

impl Compile {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, mut config: Config) -> anyhow::Result<()> {
        if let Some(matrix) = self.matrix {
            config.set_matrix(matrix);
        }
        if let Some(output) = self.output {
            config.set_output(output);
        }

        let compiler = MatrixCompiler::from_config(&config);
        let artifacts = if self.skip_validation {
            let compiled = compiler.compile()?;
            let report = compiled.report();
            if !report.is_clean() {
                for violation in &report.violations {
                    tracing::warn!("{violation}");
                }
                eprintln!("{}", paint(format_args!("Writing despite {report}"), Tone::Bad));
            }
            compiled.write(config.output())?
        } else {
            match compiler.build(config.output()) {
                Ok(artifacts) => artifacts,
                Err(CompileError::Invalid(report)) => {
                    for violation in &report.violations {
                        eprintln!("{violation}");
                    }
                    anyhow::bail!(
                        "{report}; nothing was written (run `atlas validate` for details)"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        };

        for path in [&artifacts.yaml, &artifacts.json] {
            println!("{} {}", paint("Wrote", Tone::Good), path.display());
        }
        Ok(())
    }
}
