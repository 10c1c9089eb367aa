use std::path::PathBuf;

use atlas::{Config, LayerError, LayerSelection, LayerSet, MatrixCompiler};
use clap::Parser;
use tracing::instrument;

use super::terminal::{Tone, paint};

#[derive(Debug, Parser)]
pub struct Layers {
    /// Path to the matrix definition [default: from config, or data/matrix.yaml]
    #[arg(long, short)]
    matrix: Option<PathBuf>,

    /// Directory to write layers to [default: from config, or dist]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write only one group of layers [default: all]
    #[arg(long, short, value_enum)]
    layer: Option<Group>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Group {
    /// The matrix layer
    Matrix,
    /// The case study heatmap and one layer per case study
    CaseStudy,
}

impl Layers {
    #[instrument(level = "debug", skip(self, config))]
    pub fn run(self, mut config: Config) -> anyhow::Result<()> {
        if let Some(matrix) = self.matrix {
            config.set_matrix(matrix);
        }
        if let Some(output) = self.output {
            config.set_output(output);
        }

        let compiled = MatrixCompiler::from_config(&config).compile()?;
        let layers = match LayerSet::from_matrix(&compiled) {
            Ok(layers) => layers,
            Err(LayerError::Invalid(report)) => {
                for violation in &report.violations {
                    eprintln!("{violation}");
                }
                anyhow::bail!("{report}; no layers were written");
            }
            Err(e) => return Err(e.into()),
        };

        let selection = match self.layer {
            None => LayerSelection::All,
            Some(Group::Matrix) => LayerSelection::Matrix,
            Some(Group::CaseStudy) => LayerSelection::CaseStudies,
        };
        for path in layers.write(config.output(), selection)? {
            println!("{} {}", paint("Wrote", Tone::Good), path.display());
        }
        Ok(())
    }
}
