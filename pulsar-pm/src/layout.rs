//! Production layout: classification/subtype/dimension axes and the level
//! templates each resolver walks

use pulsar_common::config::Settings;
use pulsar_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Reserved name of the terminal level holding plain files
pub const FILE_LEVEL: &str = "file";

/// Top-level production category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Asset,
    Shot,
}

impl Classification {
    pub const ALL: [Classification; 2] = [Classification::Asset, Classification::Shot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Asset => "asset",
            Classification::Shot => "shot",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asset" => Ok(Classification::Asset),
            "shot" => Ok(Classification::Shot),
            other => Err(Error::InvalidInput(format!("Unknown classification: {}", other))),
        }
    }
}

/// Media category under a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Scene,
    Render,
    Cache,
    Texture,
}

impl Subtype {
    pub const ALL: [Subtype; 4] = [Subtype::Scene, Subtype::Render, Subtype::Cache, Subtype::Texture];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::Scene => "scene",
            Subtype::Render => "render",
            Subtype::Cache => "cache",
            Subtype::Texture => "texture",
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scene" => Ok(Subtype::Scene),
            "render" => Ok(Subtype::Render),
            "cache" => Ok(Subtype::Cache),
            "texture" => Ok(Subtype::Texture),
            other => Err(Error::InvalidInput(format!("Unknown subtype: {}", other))),
        }
    }
}

/// 2d or 3d variant of a level template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    #[default]
    ThreeD,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::TwoD => "2d",
            Dimension::ThreeD => "3d",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "2d" => Ok(Dimension::TwoD),
            "3d" => Ok(Dimension::ThreeD),
            other => Err(Error::InvalidInput(format!("Unknown dimension: {}", other))),
        }
    }
}

/// Two-axis selection keying the fixed resolver table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Axis {
    pub classification: Classification,
    pub subtype: Subtype,
}

impl Axis {
    /// Number of (classification, subtype) pairs
    pub const COUNT: usize = Classification::ALL.len() * Subtype::ALL.len();

    pub fn new(classification: Classification, subtype: Subtype) -> Self {
        Self {
            classification,
            subtype,
        }
    }

    /// Slot of this pair in a `[_; Axis::COUNT]` table
    pub fn index(&self) -> usize {
        let c = self.classification as usize;
        let s = self.subtype as usize;
        c * Subtype::ALL.len() + s
    }

    /// All pairs in table order
    pub fn all() -> impl Iterator<Item = Axis> {
        Classification::ALL
            .into_iter()
            .flat_map(|c| Subtype::ALL.into_iter().map(move |s| Axis::new(c, s)))
    }
}

impl Default for Axis {
    fn default() -> Self {
        Axis::new(Classification::Asset, Subtype::Scene)
    }
}

/// Level names for both dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionLevels {
    #[serde(rename = "2d")]
    pub two_d: Vec<String>,
    #[serde(rename = "3d")]
    pub three_d: Vec<String>,
}

impl DimensionLevels {
    pub fn for_dimension(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::TwoD => &self.two_d,
            Dimension::ThreeD => &self.three_d,
        }
    }
}

/// Folder layout walked by one resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTemplate {
    /// Directory relative to the project root
    pub dir: PathBuf,
    pub levels: DimensionLevels,
}

impl LevelTemplate {
    fn default_for(axis: Axis) -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let levels = match axis.classification {
            Classification::Asset => DimensionLevels {
                two_d: names(&["asset", "task"]),
                three_d: names(&["asset", "task", "subtask"]),
            },
            Classification::Shot => DimensionLevels {
                two_d: names(&["sequence", "shot", "task"]),
                three_d: names(&["sequence", "shot", "task", "subtask"]),
            },
        };
        Self {
            dir: PathBuf::from(axis.classification.as_str()).join(axis.subtype.as_str()),
            levels,
        }
    }

    fn validate(&self, axis: Axis) -> Result<()> {
        for (dimension, levels) in [
            (Dimension::TwoD, &self.levels.two_d),
            (Dimension::ThreeD, &self.levels.three_d),
        ] {
            if levels.is_empty() {
                return Err(Error::Config(format!(
                    "Layout {}/{} has no {} levels",
                    axis.classification, axis.subtype, dimension
                )));
            }
            let mut seen = HashSet::new();
            for name in levels {
                if name.is_empty() || name == FILE_LEVEL || name.contains(['/', '\\']) {
                    return Err(Error::Config(format!(
                        "Invalid level name '{}' in layout {}/{}",
                        name, axis.classification, axis.subtype
                    )));
                }
                if !seen.insert(name.as_str()) {
                    return Err(Error::Config(format!(
                        "Duplicate level name '{}' in layout {}/{}",
                        name, axis.classification, axis.subtype
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Partial template as written in settings; missing fields keep the default
#[derive(Debug, Deserialize)]
struct TemplateOverride {
    dir: Option<PathBuf>,
    levels: Option<LevelsOverride>,
}

#[derive(Debug, Deserialize)]
struct LevelsOverride {
    #[serde(rename = "2d")]
    two_d: Option<Vec<String>>,
    #[serde(rename = "3d")]
    three_d: Option<Vec<String>>,
}

/// Level templates for all eight (classification, subtype) pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    templates: [LevelTemplate; Axis::COUNT],
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            templates: std::array::from_fn(|i| {
                let axis = Axis::all().nth(i).unwrap_or_default();
                LevelTemplate::default_for(axis)
            }),
        }
    }
}

impl ProjectLayout {
    /// Build from the `layout` settings value
    ///
    /// Expected shape: `{ "<classification>": { "<subtype>": { "dir": "...",
    /// "levels": { "2d": [...], "3d": [...] } } } }`. Every part is optional.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        let mut layout = Self::default();

        if let Some(value) = value {
            for axis in Axis::all() {
                let Some(raw) = value
                    .get(axis.classification.as_str())
                    .and_then(|c| c.get(axis.subtype.as_str()))
                else {
                    continue;
                };
                let patch: TemplateOverride = serde_json::from_value(raw.clone()).map_err(|e| {
                    Error::Config(format!(
                        "Invalid layout for {}/{}: {}",
                        axis.classification, axis.subtype, e
                    ))
                })?;

                let template = &mut layout.templates[axis.index()];
                if let Some(dir) = patch.dir {
                    template.dir = dir;
                }
                if let Some(levels) = patch.levels {
                    if let Some(two_d) = levels.two_d {
                        template.levels.two_d = two_d;
                    }
                    if let Some(three_d) = levels.three_d {
                        template.levels.three_d = three_d;
                    }
                }
            }
        }

        for axis in Axis::all() {
            layout.templates[axis.index()].validate(axis)?;
        }
        Ok(layout)
    }

    /// Read the `layout` key of the settings object
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_value(settings.get("layout"))
    }

    pub fn template(&self, axis: Axis) -> &LevelTemplate {
        &self.templates[axis.index()]
    }
}

/// Resolve the project to open from the `projects` settings map
///
/// Without a requested name the first project (by name) is used.
pub fn project_root(settings: &Settings, requested: Option<&str>) -> Result<(String, PathBuf)> {
    let projects = settings
        .get("projects")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Config("Settings define no 'projects'".to_string()))?;

    let (name, path) = match requested {
        Some(name) => projects
            .get_key_value(name)
            .ok_or_else(|| Error::NotFound(format!("Project '{}'", name)))?,
        None => projects
            .iter()
            .next()
            .ok_or_else(|| Error::Config("Settings 'projects' is empty".to_string()))?,
    };

    let path = path
        .as_str()
        .ok_or_else(|| Error::Config(format!("Project '{}' path must be a string", name)))?;
    Ok((name.clone(), PathBuf::from(path)))
}
