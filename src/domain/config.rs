use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration for compiling the knowledge base.
///
/// This struct holds settings that control where source data is read from,
/// where compiled artifacts are written, and which optional checks run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Versions")]
pub struct Config {
    /// Path to the matrix definition file.
    ///
    /// Include directives inside it are resolved relative to its directory.
    matrix: PathBuf,

    /// Directory the compiled YAML and JSON artifacts are written to.
    output: PathBuf,

    /// How deeply include directives may nest before compilation fails.
    max_include_depth: usize,

    /// Whether to flag string fields with unbalanced brackets.
    pub check_brackets: bool,

    /// Whether YAML files under the matrix directory may go unreferenced by
    /// any include directive.
    ///
    /// When `false`, such files are reported as problems by validation.
    pub allow_unreferenced: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matrix: default_matrix(),
            output: default_output(),
            max_include_depth: default_max_include_depth(),
            check_brackets: true,
            allow_unreferenced: true,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Returns the path to the matrix definition file.
    #[must_use]
    pub fn matrix(&self) -> &Path {
        &self.matrix
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Returns the maximum include nesting depth.
    #[must_use]
    pub const fn max_include_depth(&self) -> usize {
        self.max_include_depth
    }

    /// Overrides the matrix definition path.
    pub fn set_matrix(&mut self, matrix: PathBuf) {
        self.matrix = matrix;
    }

    /// Overrides the output directory.
    pub fn set_output(&mut self, output: PathBuf) {
        self.output = output;
    }
}

fn default_matrix() -> PathBuf {
    PathBuf::from("data/matrix.yaml")
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

const fn default_max_include_depth() -> usize {
    16
}

const fn default_true() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_matrix")]
        matrix: PathBuf,

        #[serde(default = "default_output")]
        output: PathBuf,

        #[serde(default = "default_max_include_depth")]
        max_include_depth: usize,

        #[serde(default = "default_true")]
        check_brackets: bool,

        #[serde(default = "default_true")]
        allow_unreferenced: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                matrix,
                output,
                max_include_depth,
                check_brackets,
                allow_unreferenced,
            } => Self {
                matrix,
                output,
                max_include_depth,
                check_brackets,
                allow_unreferenced,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\nmatrix = \"src/matrix.yaml\"\noutput = \"out\"\nmax_include_depth = 4\ncheck_brackets = false\nallow_unreferenced = false\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.matrix(), Path::new("src/matrix.yaml"));
        assert_eq!(config.output(), Path::new("out"));
        assert_eq!(config.max_include_depth(), 4);
        assert!(!config.check_brackets);
        assert!(!config.allow_unreferenced);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nmax_include_depth = \"deep\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }
}
