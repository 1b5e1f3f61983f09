//! Asset-path resolver
//!
//! One stateful navigator per (classification, subtype). It walks the folder
//! hierarchy below `project_root/<dir>` one level at a time:
//!
//! ```text
//! asset/scene/            <- root, listed for level "asset"
//! ├── Hero/               <- value of "asset", listed for "task"
//! │   └── model/          <- value of "task", listed for "subtask"
//! │       └── hi/         <- value of "subtask", listed for "file"
//! │           └── hero.ma
//! ```
//!
//! Every level holds an optional value and an optional listing. A listing is
//! only present once every shallower level holds a value; clearing a level
//! drops the values and listings below it.
//!
//! Listings are asynchronous. Each one is tagged with the resolver's
//! generation when it is requested, and any state change bumps the
//! generation, so a listing that completes after a newer request (or after
//! the state moved on) is discarded instead of overwriting fresher data.

mod files;

pub use files::{render_template, software_stub, validate_component};

use crate::layout::{Axis, Dimension, LevelTemplate, FILE_LEVEL};
use crate::metadata::{FileMetadata, MetadataStore};
use crate::software::{TaskBridge, TaskHandle, TaskRequest, TaskTarget};
use pulsar_common::events::SelectedFile;
use pulsar_common::fs::{DirEntry, Filesystem};
use pulsar_common::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extent of a clear / search-path computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Whole hierarchy, from the resolver root
    Project,
    /// Levels deeper than the named one
    Level(String),
}

/// One rung of the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub name: String,
    /// Selected value, `None` while unset
    pub value: Option<String>,
    /// Children available for this level, `None` until listed
    pub listing: Option<Vec<String>>,
}

impl Level {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            listing: None,
        }
    }
}

/// Directory listing issued by [`AssetPathResolver::begin_search`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub generation: u64,
    pub level: usize,
    pub path: PathBuf,
}

/// Collaborators shared by all resolvers of a project
#[derive(Clone)]
pub struct ResolverDeps {
    pub fs: Arc<dyn Filesystem>,
    pub metadata: MetadataStore,
    pub bridge: Arc<dyn TaskBridge>,
}

impl ResolverDeps {
    pub fn new(fs: Arc<dyn Filesystem>, bridge: Arc<dyn TaskBridge>) -> Self {
        Self {
            metadata: MetadataStore::new(fs.clone()),
            fs,
            bridge,
        }
    }
}

/// Stateful navigator for one (classification, subtype) pair
pub struct AssetPathResolver {
    axis: Axis,
    root: PathBuf,
    template: LevelTemplate,
    dimension: Dimension,
    levels: Vec<Level>,
    search_dir: PathBuf,
    search_level: Option<usize>,
    generation: u64,
    deps: ResolverDeps,
}

impl AssetPathResolver {
    pub fn new(axis: Axis, project_root: &Path, template: LevelTemplate, deps: ResolverDeps) -> Self {
        let root = project_root.join(&template.dir);
        let dimension = Dimension::default();
        let levels = build_levels(&template, dimension);
        Self {
            axis,
            search_dir: root.clone(),
            search_level: Some(0),
            root,
            template,
            dimension,
            levels,
            generation: 0,
            deps,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Directory the next listing reads
    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    /// Level the next listing fills, `None` when every level is set
    pub fn search_level(&self) -> Option<usize> {
        self.search_level
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn filesystem(&self) -> Arc<dyn Filesystem> {
        self.deps.fs.clone()
    }

    /// Index of the first unset level (the navigation position)
    pub fn current_level(&self) -> usize {
        self.levels
            .iter()
            .position(|l| l.value.is_none())
            .unwrap_or(self.levels.len())
    }

    /// Switch the 2d/3d level template
    ///
    /// Values and listings are carried over by level name; nothing is reset
    /// or re-listed. Callers clear afterwards to get a consistent state.
    pub fn set_dimension(&mut self, dimension: Dimension) {
        if dimension == self.dimension {
            return;
        }
        let mut previous = std::mem::take(&mut self.levels);
        self.levels = build_levels(&self.template, dimension)
            .into_iter()
            .map(|mut level| {
                // the directory depth changes, so the selected file no longer resolves
                if level.name == FILE_LEVEL {
                    return level;
                }
                if let Some(old) = previous.iter_mut().find(|old| old.name == level.name) {
                    level.value = old.value.take();
                    level.listing = old.listing.take();
                }
                level
            })
            .collect();
        self.dimension = dimension;
        self.generation += 1;
        info!(
            "{}/{} switched to {}",
            self.axis.classification, self.axis.subtype, dimension
        );
    }

    /// Reset selected values
    ///
    /// `Project` unsets every level. `Level(name)` unsets only the levels
    /// deeper than `name`, keeping the listing of the level right below it.
    pub fn clear_values(&mut self, scope: &Scope) -> Result<()> {
        match scope {
            Scope::Project => self.reset_from(0, 0),
            Scope::Level(name) => {
                let index = self.level_index(name)?;
                self.reset_from(index + 1, index + 2);
            }
        }
        Ok(())
    }

    /// Recompute the directory the next listing reads
    ///
    /// The path is the root joined with the concrete values in level order,
    /// stopping at the first unset level. `Level(name)` additionally stops
    /// after `name`, which re-lists the level right below it.
    pub fn set_search_dir(&mut self, scope: &Scope) -> Result<()> {
        let limit = match scope {
            Scope::Project => self.levels.len(),
            Scope::Level(name) => self.level_index(name)? + 1,
        };

        let mut path = self.root.clone();
        let mut depth = 0;
        for level in self.levels.iter().take(limit) {
            match &level.value {
                Some(value) => {
                    path.push(value);
                    depth += 1;
                }
                None => break,
            }
        }

        self.search_dir = path;
        self.search_level = (depth < self.levels.len()).then_some(depth);
        Ok(())
    }

    /// Issue a listing for the current search position
    ///
    /// Supersedes every listing issued before. Returns `None` when there is
    /// nothing left to list.
    pub fn begin_search(&mut self) -> Option<ListingRequest> {
        let level = self.search_level?;
        self.generation += 1;
        Some(ListingRequest {
            generation: self.generation,
            level,
            path: self.search_dir.clone(),
        })
    }

    /// Store the result of `request`; returns false if it was superseded
    pub fn apply_listing(&mut self, request: &ListingRequest, entries: Vec<DirEntry>) -> bool {
        if request.generation != self.generation {
            debug!(
                "Discarding stale listing of {} (generation {} < {})",
                request.path.display(),
                request.generation,
                self.generation
            );
            return false;
        }
        let Some(level) = self.levels.get_mut(request.level) else {
            return false;
        };

        let want_files = level.name == FILE_LEVEL;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|e| !e.is_hidden() && e.is_dir() != want_files)
            .map(|e| e.name)
            .collect();
        names.sort();

        debug!(
            "Listed {} entries for level '{}' in {}",
            names.len(),
            level.name,
            request.path.display()
        );
        level.listing = Some(names);
        true
    }

    /// List the current search directory into its level
    ///
    /// Repeated calls on an unchanged filesystem give the same listing.
    pub async fn search_next(&mut self) -> bool {
        let Some(request) = self.begin_search() else {
            return false;
        };
        let entries = fetch_listing(self.deps.fs.as_ref(), &request).await;
        self.apply_listing(&request, entries)
    }

    /// Commit a value for `group` without listing
    ///
    /// Clears the deeper levels and points the search at the level below.
    pub fn commit_group_value(&mut self, group: &str, value: &str) -> Result<()> {
        let index = self.level_index(group)?;
        validate_component(group, value)?;
        self.require_concrete(index, group)?;

        if self.levels[index].value.as_deref() != Some(value) {
            self.levels[index].value = Some(value.to_string());
            self.generation += 1;
        }
        self.reset_from(index + 1, index + 1);
        self.set_search_dir(&Scope::Project)?;
        info!(
            "{}/{}: {} = {}",
            self.axis.classification, self.axis.subtype, group, value
        );
        Ok(())
    }

    /// Commit a value for `group` and refresh everything below it
    pub async fn set_group_value(&mut self, group: &str, value: &str) -> Result<()> {
        self.commit_group_value(group, value)?;
        self.search_next().await;
        Ok(())
    }

    /// Create the directory `value` under the resolved parent of `group`
    ///
    /// The new name is merged into the level's current listing.
    pub async fn create_group_dir(&mut self, group: &str, value: &str) -> Result<PathBuf> {
        let index = self.level_index(group)?;
        if group == FILE_LEVEL {
            return Err(Error::InvalidInput(
                "Files are created with create_new_file".to_string(),
            ));
        }
        validate_component(group, value)?;
        self.require_concrete(index, group)?;

        let dir = self.path_through(index).join(value);
        self.deps.fs.make_dir(&dir).await?;
        info!("Created {}", dir.display());

        if let Some(listing) = self.levels[index].listing.as_mut() {
            if let Err(pos) = listing.binary_search_by(|name| name.as_str().cmp(value)) {
                listing.insert(pos, value.to_string());
            }
        }
        Ok(dir)
    }

    /// Create a new child directory for `group`, then select it
    pub async fn create_new_group_value(&mut self, group: &str, value: &str) -> Result<()> {
        self.create_group_dir(group, value).await?;
        self.set_group_value(group, value).await
    }

    /// Materialize a new file in the fully resolved directory and select it
    ///
    /// Leaves the search pointed at the file level so the next listing
    /// includes the new file. Returns the created path.
    pub async fn create_file(
        &mut self,
        name: &str,
        template: Option<&Path>,
        software: Option<&str>,
    ) -> Result<PathBuf> {
        let file_index = self.file_index();
        self.require_concrete(file_index, "file")?;
        validate_component("File", name)?;
        let dir = self.path_through(file_index);

        let (file_name, content) = match (template, software) {
            (Some(template), _) => {
                let ext = template.extension().and_then(|e| e.to_str());
                let file_name = with_extension(name, ext);
                let bytes = self.deps.fs.read_file(template).await?;
                let content = match String::from_utf8(bytes) {
                    Ok(text) => {
                        let text = self.render_placeholders(&text, name, software.unwrap_or(""));
                        FileContent::Bytes(text.into_bytes())
                    }
                    Err(_) => FileContent::CopyOf(template.to_path_buf()),
                };
                (file_name, content)
            }
            (None, Some(software)) => {
                let (ext, stub) = software_stub(software, name).ok_or_else(|| {
                    Error::InvalidInput(format!("No empty scene known for software '{}'", software))
                })?;
                (with_extension(name, Some(ext)), FileContent::Bytes(stub.into_bytes()))
            }
            (None, None) => {
                return Err(Error::InvalidInput(
                    "A template or a software type is required".to_string(),
                ))
            }
        };

        let path = dir.join(&file_name);
        if self.deps.fs.exists(&path).await {
            return Err(Error::InvalidInput(format!("{} already exists", path.display())));
        }
        match content {
            FileContent::Bytes(bytes) => self.deps.fs.write_file(&path, &bytes).await?,
            FileContent::CopyOf(src) => self.deps.fs.copy_file(&src, &path).await?,
        }
        info!("Created file {}", path.display());

        self.levels[file_index].value = Some(file_name);
        let parent = self.levels[file_index - 1].name.clone();
        self.set_search_dir(&Scope::Level(parent))?;
        Ok(path)
    }

    /// Create a new file (see [`create_file`](Self::create_file)) and refresh
    /// the file listing
    pub async fn create_new_file(
        &mut self,
        name: &str,
        template: Option<&Path>,
        software: Option<&str>,
    ) -> Result<PathBuf> {
        let path = self.create_file(name, template, software).await?;
        self.search_next().await;
        Ok(path)
    }

    /// Build a task request for the selected file and hand it to the bridge
    ///
    /// `software_id` is a connected instance id, or `"new"` to launch one.
    pub fn exec_task(
        &self,
        software_id: &str,
        software_type: &str,
        command: &str,
        args: Value,
    ) -> Result<TaskHandle> {
        let file = self.require_selected_file()?;
        let request = TaskRequest {
            id: Uuid::new_v4(),
            target: TaskTarget::from_software_id(software_id),
            software_type: software_type.to_string(),
            command: command.to_string(),
            args,
            file,
        };
        info!(
            "Dispatching '{}' to {} ({}) for {}",
            request.command,
            request.target.as_str(),
            request.software_type,
            request.file.display()
        );
        self.deps.bridge.submit(request)
    }

    pub async fn save_comment(&self, comment: &str) -> Result<FileMetadata> {
        let file = self.require_selected_file()?;
        self.deps.metadata.save_comment(&file, comment).await
    }

    pub async fn save_tag(&self, tag: &str) -> Result<FileMetadata> {
        let file = self.require_selected_file()?;
        self.deps.metadata.save_tag(&file, tag).await
    }

    pub async fn delete_tag(&self, tag: &str) -> Result<FileMetadata> {
        let file = self.require_selected_file()?;
        self.deps.metadata.delete_tag(&file, tag).await
    }

    pub async fn file_metadata(&self) -> Result<FileMetadata> {
        let file = self.require_selected_file()?;
        self.deps.metadata.load(&file).await
    }

    /// Level name -> selected value
    pub fn groups(&self) -> BTreeMap<String, Option<String>> {
        self.levels
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect()
    }

    /// Level name -> listing, for levels that have one
    pub fn directories(&self) -> BTreeMap<String, Vec<String>> {
        self.levels
            .iter()
            .filter_map(|l| l.listing.clone().map(|listing| (l.name.clone(), listing)))
            .collect()
    }

    /// Names of listed levels in display order
    pub fn directories_order(&self) -> Vec<String> {
        self.levels
            .iter()
            .filter(|l| l.listing.is_some())
            .map(|l| l.name.clone())
            .collect()
    }

    /// Full path of the selected file, if every level is set
    pub fn selected_file_path(&self) -> Option<PathBuf> {
        if self.levels.iter().any(|l| l.value.is_none()) {
            return None;
        }
        Some(self.path_through(self.levels.len()))
    }

    /// Selected file with its metadata, empty when no file is selected
    pub async fn selected_file(&self) -> SelectedFile {
        let Some(path) = self.selected_file_path() else {
            return SelectedFile::default();
        };
        let mut selected = SelectedFile {
            name: self.levels[self.file_index()].value.clone(),
            path: Some(path.display().to_string()),
            ..Default::default()
        };
        match self.deps.metadata.load(&path).await {
            Ok(metadata) => {
                selected.tags = Some(metadata.tags);
                selected.comments = Some(metadata.comments);
            }
            Err(e) => warn!("Cannot read metadata of {}: {}", path.display(), e),
        }
        selected
    }

    fn file_index(&self) -> usize {
        self.levels.len() - 1
    }

    fn level_index(&self, name: &str) -> Result<usize> {
        self.levels
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Unknown level '{}' for {}/{} ({})",
                    name, self.axis.classification, self.axis.subtype, self.dimension
                ))
            })
    }

    /// Every level shallower than `index` must hold a value
    fn require_concrete(&self, index: usize, what: &str) -> Result<()> {
        if let Some(unset) = self.levels[..index].iter().find(|l| l.value.is_none()) {
            return Err(Error::Precondition(format!(
                "Cannot resolve '{}': level '{}' is unset",
                what, unset.name
            )));
        }
        Ok(())
    }

    fn require_selected_file(&self) -> Result<PathBuf> {
        self.selected_file_path()
            .ok_or_else(|| Error::Precondition("No file selected".to_string()))
    }

    /// Root joined with the values of the first `count` levels
    fn path_through(&self, count: usize) -> PathBuf {
        let mut path = self.root.clone();
        for value in self.levels[..count].iter().filter_map(|l| l.value.as_ref()) {
            path.push(value);
        }
        path
    }

    /// Drop values from `first_value` and listings from `first_listing` on;
    /// outstanding listings are superseded if anything changed
    fn reset_from(&mut self, first_value: usize, first_listing: usize) {
        let mut changed = false;
        for (i, level) in self.levels.iter_mut().enumerate() {
            if i >= first_value && level.value.take().is_some() {
                changed = true;
            }
            if i >= first_listing && level.listing.take().is_some() {
                changed = true;
            }
        }
        if changed {
            self.generation += 1;
        }
    }

    fn render_placeholders(&self, text: &str, name: &str, software: &str) -> String {
        let mut vars: Vec<(&str, &str)> = vec![
            ("name", name),
            ("type", software),
            ("dimension", self.dimension.as_str()),
            ("classification", self.axis.classification.as_str()),
            ("subtype", self.axis.subtype.as_str()),
        ];
        for level in &self.levels {
            if let Some(value) = &level.value {
                vars.push((level.name.as_str(), value.as_str()));
            }
        }
        render_template(text, &vars)
    }
}

enum FileContent {
    Bytes(Vec<u8>),
    CopyOf(PathBuf),
}

fn with_extension(name: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) if !ext.is_empty() => format!("{}.{}", name, ext),
        _ => name.to_string(),
    }
}

fn build_levels(template: &LevelTemplate, dimension: Dimension) -> Vec<Level> {
    template
        .levels
        .for_dimension(dimension)
        .iter()
        .map(Level::new)
        .chain(std::iter::once(Level::new(FILE_LEVEL)))
        .collect()
}

/// Run the directory listing for `request`
///
/// A missing or unreadable directory lists as empty: shallow levels may
/// legitimately have no children yet.
pub async fn fetch_listing(fs: &dyn Filesystem, request: &ListingRequest) -> Vec<DirEntry> {
    match fs.list_children(&request.path).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Listing {} failed, using empty listing: {}", request.path.display(), e);
            Vec::new()
        }
    }
}
