//! ATT&CK Navigator layers for a compiled matrix.
//!
//! Three kinds of layer are derived from a compiled document:
//!
//! - a matrix layer highlighting every technique under each of its tactics,
//! - a heatmap scoring each technique by how many case study steps use it,
//! - one layer per case study highlighting the techniques it used.
//!
//! Layers name tactics the way the Navigator does: the tactic name in lower
//! case, with spaces replaced by hyphens (`Initial Access` becomes
//! `initial-access`).

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_yaml::Value;

use crate::{
    domain::{IdPattern, ObjectKind, object::ID},
    matrix::{CompiledMatrix, EmitError},
    schema::ValidationReport,
};

const LAYER_VERSION: &str = "4.2";
const NAVIGATOR_VERSION: &str = "4.2";
const NAVIGATOR_DOMAIN: &str = "atlas-v2-+-enterprise-v9-atlas";
const HIGHLIGHT: &str = "#C8E6C9";
const HEATMAP: [&str; 2] = ["#FFFFFF", "#F44336"];

/// The directory, below the output directory, holding the matrix-wide layers.
pub const DEFAULT_LAYER_DIR: &str = "default-navigator-layers";

/// The directory, below the output directory, holding one layer per case
/// study.
pub const CASE_STUDY_LAYER_DIR: &str = "case-study-layers";

const MATRIX_LAYER_FILE: &str = "atlas_layer_matrix.json";
const FREQUENCY_LAYER_FILE: &str = "atlas_case_study_frequency.json";

/// Errors that can occur while deriving or writing layers.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// Layers are only derived from a matrix without violations.
    #[error("compiled matrix has schema violations: {0}")]
    Invalid(ValidationReport),

    /// An object lacks a string field a layer needs.
    #[error("{object} has no string '{field}'")]
    MissingField {
        /// The object, or its owner for procedure steps.
        object: String,
        /// The missing field.
        field: &'static str,
    },

    /// A technique lists a tactic the compiled matrix does not carry.
    #[error("{technique} lists tactic '{tactic}', which is not in the compiled matrix")]
    UnknownTactic {
        /// The technique ID.
        technique: String,
        /// The tactic ID as listed.
        tactic: String,
    },

    /// A layer file could not be written.
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Which layers to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerSelection {
    /// Every layer.
    #[default]
    All,
    /// The matrix layer only.
    Matrix,
    /// The case study heatmap and the per-case-study layers.
    CaseStudies,
}

impl LayerSelection {
    const fn matrix(self) -> bool {
        matches!(self, Self::All | Self::Matrix)
    }

    const fn case_studies(self) -> bool {
        matches!(self, Self::All | Self::CaseStudies)
    }
}

/// A single Navigator layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// The title shown at the top of the Navigator tab.
    pub name: String,
    /// The layer format versions.
    pub versions: LayerVersions,
    /// The Navigator domain the layer applies to.
    pub domain: String,
    /// The text shown in the layer dropdown.
    pub description: String,
    /// The highlighted or scored techniques.
    pub techniques: Vec<TechniqueEntry>,
    /// The score gradient of a heatmap layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Gradient>,
    /// The legend of a highlight layer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub legend_items: Vec<LegendItem>,
}

/// The layer and Navigator format versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerVersions {
    /// The layer format version.
    pub layer: String,
    /// The Navigator version.
    pub navigator: String,
}

/// A technique cell in a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueEntry {
    /// The technique or sub-technique ID.
    #[serde(rename = "techniqueID")]
    pub technique_id: String,
    /// The Navigator name of the tactic column, if the cell is placed in one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactic: Option<String>,
    /// The highlight colour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// The heatmap score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<usize>,
    /// Whether the cell starts with its sub-techniques expanded.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub show_subtechniques: bool,
}

/// The colour scale of a heatmap layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradient {
    /// Colours from the lowest to the highest score.
    pub colors: Vec<String>,
    /// The score mapped to the first colour.
    pub min_value: usize,
    /// The score mapped to the last colour.
    pub max_value: usize,
}

/// A legend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendItem {
    /// The legend text.
    pub label: String,
    /// The colour it explains.
    pub color: String,
}

/// Every layer derived from one compiled matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSet {
    /// Every technique highlighted under its tactics.
    pub matrix: Layer,
    /// Techniques scored by how often case studies use them.
    pub frequency: Layer,
    /// One layer per case study, keyed by case study ID, in document order.
    pub case_studies: Vec<(String, Layer)>,
}

impl LayerSet {
    /// Derives the layers of a compiled matrix.
    ///
    /// # Errors
    ///
    /// Fails when the matrix has schema violations, when an object lacks a
    /// field a layer needs, or when a technique lists a tactic the matrix
    /// does not carry.
    pub fn from_matrix(compiled: &CompiledMatrix) -> Result<Self, LayerError> {
        if !compiled.report().is_clean() {
            return Err(LayerError::Invalid(compiled.report().clone()));
        }
        let view = MatrixView::new(compiled.id(), compiled.document())?;

        Ok(Self {
            matrix: view.matrix_layer()?,
            frequency: view.frequency_layer()?,
            case_studies: view.case_study_layers()?,
        })
    }

    /// Writes the selected layers below `dir` and returns the files written.
    ///
    /// Matrix-wide layers go to [`DEFAULT_LAYER_DIR`] and case study layers
    /// to [`CASE_STUDY_LAYER_DIR`]. Every layer is rendered before any file
    /// is written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem operation fails.
    pub fn write(&self, dir: &Path, selection: LayerSelection) -> Result<Vec<PathBuf>, EmitError> {
        let defaults = dir.join(DEFAULT_LAYER_DIR);
        let mut layers = Vec::new();
        if selection.matrix() {
            layers.push((defaults.join(MATRIX_LAYER_FILE), &self.matrix));
        }
        if selection.case_studies() {
            layers.push((defaults.join(FREQUENCY_LAYER_FILE), &self.frequency));
            for (id, layer) in &self.case_studies {
                let file = format!("{id}-case_study_layer.json");
                layers.push((dir.join(CASE_STUDY_LAYER_DIR).join(file), layer));
            }
        }

        let rendered = layers
            .into_iter()
            .map(|(path, layer)| -> Result<_, EmitError> {
                let mut json = serde_json::to_string_pretty(layer)?;
                json.push('\n');
                Ok((path, json))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut written = Vec::with_capacity(rendered.len());
        for (path, json) in rendered {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| EmitError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::write(&path, json).map_err(|source| EmitError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// The parts of a compiled document the layers are built from.
struct MatrixView<'a> {
    id: &'a str,
    name: &'a str,
    /// Tactic ID to Navigator tactic name.
    tactics: BTreeMap<&'a str, String>,
    techniques: &'a [Value],
    case_studies: &'a [Value],
}

impl<'a> MatrixView<'a> {
    fn new(id: &'a str, document: &'a Value) -> Result<Self, LayerError> {
        let mut tactics = BTreeMap::new();
        for tactic in category(document, ObjectKind::Tactic) {
            let tactic_id = field(tactic, ID, "tactic")?;
            let name = field(tactic, "name", tactic_id)?;
            tactics.insert(tactic_id, navigator_name(name));
        }

        Ok(Self {
            id,
            name: document.get("name").and_then(Value::as_str).unwrap_or(id),
            tactics,
            techniques: category(document, ObjectKind::Technique),
            case_studies: category(document, ObjectKind::CaseStudy),
        })
    }

    fn matrix_layer(&self) -> Result<Layer, LayerError> {
        let mut techniques = Vec::new();
        for technique in self.techniques {
            let id = field(technique, ID, "technique")?;
            match IdPattern::classify(id) {
                Some(IdPattern::Technique) => {
                    for tactic in sequence(technique, "tactics") {
                        let tactic = tactic.as_str().unwrap_or_default();
                        let column = self.tactics.get(tactic).ok_or_else(|| {
                            LayerError::UnknownTactic {
                                technique: id.to_string(),
                                tactic: tactic.to_string(),
                            }
                        })?;
                        techniques.push(TechniqueEntry {
                            tactic: Some(column.clone()),
                            color: Some(HIGHLIGHT.to_string()),
                            show_subtechniques: true,
                            ..entry(id)
                        });
                    }
                }
                Some(IdPattern::Subtechnique) => techniques.push(TechniqueEntry {
                    color: Some(HIGHLIGHT.to_string()),
                    ..entry(id)
                }),
                _ => tracing::debug!("Leaving {id} out of the matrix layer"),
            }
        }

        Ok(Layer {
            legend_items: self.legend(),
            ..self.layer(format!("{} Matrix", self.id), self.name.to_string(), techniques)
        })
    }

    fn frequency_layer(&self) -> Result<Layer, LayerError> {
        // (technique, tactic) pairs in first-use order, with their step counts.
        let mut counts: Vec<((&str, &str), usize)> = Vec::new();
        for case_study in self.case_studies {
            let owner = field(case_study, ID, "case study")?;
            for step in sequence(case_study, "procedure") {
                let key = (field(step, "technique", owner)?, field(step, "tactic", owner)?);
                match counts.iter_mut().find(|(seen, _)| *seen == key) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((key, 1)),
                }
            }
        }

        let techniques = counts
            .into_iter()
            .map(|((technique, tactic), count)| TechniqueEntry {
                tactic: Some(self.column(tactic)),
                score: Some(count),
                show_subtechniques: IdPattern::classify(technique) == Some(IdPattern::Technique),
                ..entry(technique)
            })
            .collect();

        Ok(Layer {
            gradient: Some(Gradient {
                colors: HEATMAP.iter().map(ToString::to_string).collect(),
                min_value: 0,
                max_value: self.case_studies.len(),
            }),
            ..self.layer(
                format!("{} Case Study Frequency", self.id),
                format!("Heatmap of techniques used in {} case studies", self.id),
                techniques,
            )
        })
    }

    fn case_study_layers(&self) -> Result<Vec<(String, Layer)>, LayerError> {
        let mut layers = Vec::with_capacity(self.case_studies.len());
        for case_study in self.case_studies {
            let id = field(case_study, ID, "case study")?;
            let steps = sequence(case_study, "procedure");
            let used: Vec<&str> = steps
                .iter()
                .filter_map(|step| step.get("technique").and_then(Value::as_str))
                .collect();

            let mut techniques = Vec::new();
            for step in steps {
                let technique = field(step, "technique", id)?;
                let column = self.column(field(step, "tactic", id)?);

                if IdPattern::classify(technique) == Some(IdPattern::Subtechnique) {
                    if let Some((parent, _)) = technique.rsplit_once('.') {
                        push_unique(&mut techniques, TechniqueEntry {
                            tactic: Some(column.clone()),
                            color: used.contains(&parent).then(|| HIGHLIGHT.to_string()),
                            show_subtechniques: true,
                            ..entry(parent)
                        });
                    }
                }
                push_unique(&mut techniques, TechniqueEntry {
                    tactic: Some(column),
                    color: Some(HIGHLIGHT.to_string()),
                    ..entry(technique)
                });
            }

            let layer = Layer {
                legend_items: self.legend(),
                ..self.layer(
                    field(case_study, "name", id)?.to_string(),
                    field(case_study, "summary", id)?.to_string(),
                    techniques,
                )
            };
            layers.push((id.to_string(), layer));
        }
        Ok(layers)
    }

    /// The Navigator column for a tactic ID. IDs the matrix does not carry are
    /// used as given.
    fn column(&self, tactic: &str) -> String {
        self.tactics
            .get(tactic)
            .cloned()
            .unwrap_or_else(|| tactic.to_string())
    }

    fn legend(&self) -> Vec<LegendItem> {
        vec![LegendItem {
            label: format!("{} technique", self.id),
            color: HIGHLIGHT.to_string(),
        }]
    }

    fn layer(&self, name: String, description: String, techniques: Vec<TechniqueEntry>) -> Layer {
        Layer {
            name,
            versions: LayerVersions {
                layer: LAYER_VERSION.to_string(),
                navigator: NAVIGATOR_VERSION.to_string(),
            },
            domain: NAVIGATOR_DOMAIN.to_string(),
            description,
            techniques,
            gradient: None,
            legend_items: Vec::new(),
        }
    }
}

fn entry(technique: &str) -> TechniqueEntry {
    TechniqueEntry {
        technique_id: technique.to_string(),
        tactic: None,
        color: None,
        score: None,
        show_subtechniques: false,
    }
}

fn push_unique(entries: &mut Vec<TechniqueEntry>, entry: TechniqueEntry) {
    if !entries.contains(&entry) {
        entries.push(entry);
    }
}

fn navigator_name(tactic: &str) -> String {
    tactic.replace(' ', "-").to_lowercase()
}

fn category(document: &Value, kind: ObjectKind) -> &[Value] {
    sequence(document, kind.category())
}

fn sequence<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn field<'a>(value: &'a Value, key: &'static str, owner: &str) -> Result<&'a str, LayerError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| LayerError::MissingField {
            object: value
                .get(ID)
                .and_then(Value::as_str)
                .unwrap_or(owner)
                .to_string(),
            field: key,
        })
}
