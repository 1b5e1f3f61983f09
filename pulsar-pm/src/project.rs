//! Project orchestrator
//!
//! Owns the eight asset-path resolvers of an open project (one per
//! classification x subtype), routes every UI action to the active one and
//! pushes a [`ProjectSnapshot`] on the EventBus after each state change.
//!
//! Resolvers are created once when the project opens and live for the whole
//! session. Each sits behind its own lock, so mutations of one resolver are
//! serialized while different resolvers stay independent. Directory listings
//! run with the lock released; the resolver's generation check decides
//! whether a finished listing is still the latest one.

use crate::layout::{Axis, Classification, Dimension, ProjectLayout, Subtype};
use crate::metadata::FileMetadata;
use crate::resolver::{fetch_listing, AssetPathResolver, ListingRequest, ResolverDeps, Scope};
use crate::software::TaskHandle;
use pulsar_common::events::{EventBus, ProjectSnapshot, PulsarEvent};
use pulsar_common::fs::Filesystem;
use pulsar_common::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// An open production project
pub struct Project {
    name: String,
    root: PathBuf,
    resolvers: [Mutex<AssetPathResolver>; Axis::COUNT],
    axis: RwLock<Axis>,
    fs: Arc<dyn Filesystem>,
    bus: EventBus,
}

impl Project {
    /// Open `root` as project `name`, building all eight resolvers eagerly
    pub fn open(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        layout: &ProjectLayout,
        deps: ResolverDeps,
        bus: EventBus,
    ) -> Self {
        let name = name.into();
        let root = root.into();
        if !root.is_dir() {
            warn!("Project root {} does not exist yet", root.display());
        }

        let resolvers = std::array::from_fn(|i| {
            let axis = Axis::all().nth(i).unwrap_or_default();
            Mutex::new(AssetPathResolver::new(
                axis,
                &root,
                layout.template(axis).clone(),
                deps.clone(),
            ))
        });
        info!("Opened project '{}' at {}", name, root.display());

        Self {
            name,
            root,
            resolvers,
            axis: RwLock::new(Axis::default()),
            fs: deps.fs,
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Currently active (classification, subtype)
    pub async fn axis(&self) -> Axis {
        *self.axis.read().await
    }

    /// Resolver for `axis`, active or not
    pub fn resolver(&self, axis: Axis) -> &Mutex<AssetPathResolver> {
        &self.resolvers[axis.index()]
    }

    /// Activate the resolver for (classification, subtype)
    ///
    /// Steps, in order:
    /// 1. swap the active axis
    /// 2. reset the newly active resolver to the project root
    /// 3. re-derive its search path
    /// 4. list the top level
    /// 5. emit and return the snapshot
    ///
    /// The resolver itself is reused, so per-axis settings such as the
    /// dimension survive switching away and back.
    pub async fn select_axis(
        &self,
        classification: Classification,
        subtype: Subtype,
    ) -> Result<ProjectSnapshot> {
        let axis = Axis::new(classification, subtype);
        *self.axis.write().await = axis;
        info!("Active axis: {}/{}", classification, subtype);

        self.restart(axis).await?;
        Ok(self.publish(axis).await)
    }

    /// Switch the classification, keeping the subtype
    pub async fn set_classification(&self, classification: Classification) -> Result<ProjectSnapshot> {
        let subtype = self.axis().await.subtype;
        self.select_axis(classification, subtype).await
    }

    /// Switch the subtype, keeping the classification
    pub async fn set_subtype(&self, subtype: Subtype) -> Result<ProjectSnapshot> {
        let classification = self.axis().await.classification;
        self.select_axis(classification, subtype).await
    }

    /// Reset the active resolver to the project root and re-list it
    pub async fn get_data(&self) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        self.restart(axis).await?;
        Ok(self.publish(axis).await)
    }

    /// Switch the 2d/3d template of the active resolver
    ///
    /// Navigation state is kept; call [`get_data`](Self::get_data) afterwards
    /// to restart from the root with the new levels.
    pub async fn set_dimension(&self, dimension: Dimension) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        self.resolver(axis).lock().await.set_dimension(dimension);
        Ok(self.publish(axis).await)
    }

    pub async fn set_group_value(&self, group: &str, value: &str) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        let request = {
            let mut resolver = self.resolver(axis).lock().await;
            resolver.commit_group_value(group, value)?;
            resolver.begin_search()
        };
        self.complete_listing(axis, request).await;
        Ok(self.publish(axis).await)
    }

    pub async fn create_new_group_value(&self, group: &str, value: &str) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        let request = {
            let mut resolver = self.resolver(axis).lock().await;
            resolver.create_group_dir(group, value).await?;
            resolver.commit_group_value(group, value)?;
            resolver.begin_search()
        };
        self.complete_listing(axis, request).await;
        Ok(self.publish(axis).await)
    }

    pub async fn create_new_file(
        &self,
        name: &str,
        template: Option<&Path>,
        software: Option<&str>,
    ) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        let request = {
            let mut resolver = self.resolver(axis).lock().await;
            resolver.create_file(name, template, software).await?;
            resolver.begin_search()
        };
        self.complete_listing(axis, request).await;
        Ok(self.publish(axis).await)
    }

    /// Dispatch a task against the selected file of the active resolver
    pub async fn exec_task(
        &self,
        software_id: &str,
        software_type: &str,
        command: &str,
        args: Value,
    ) -> Result<TaskHandle> {
        let axis = self.axis().await;
        let resolver = self.resolver(axis).lock().await;
        resolver.exec_task(software_id, software_type, command, args)
    }

    pub async fn save_comment(&self, comment: &str) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        self.resolver(axis).lock().await.save_comment(comment).await?;
        Ok(self.publish(axis).await)
    }

    pub async fn save_tag(&self, tag: &str) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        self.resolver(axis).lock().await.save_tag(tag).await?;
        Ok(self.publish(axis).await)
    }

    pub async fn delete_tag(&self, tag: &str) -> Result<ProjectSnapshot> {
        let axis = self.axis().await;
        self.resolver(axis).lock().await.delete_tag(tag).await?;
        Ok(self.publish(axis).await)
    }

    /// Comments and tags of the selected file
    pub async fn file_metadata(&self) -> Result<FileMetadata> {
        let axis = self.axis().await;
        self.resolver(axis).lock().await.file_metadata().await
    }

    /// Current state of the active resolver, without emitting
    pub async fn snapshot(&self) -> ProjectSnapshot {
        let axis = self.axis().await;
        self.build_snapshot(axis).await
    }

    async fn restart(&self, axis: Axis) -> Result<()> {
        let request = {
            let mut resolver = self.resolver(axis).lock().await;
            resolver.clear_values(&Scope::Project)?;
            resolver.set_search_dir(&Scope::Project)?;
            resolver.begin_search()
        };
        self.complete_listing(axis, request).await;
        Ok(())
    }

    /// Run `request` without holding the resolver lock, then apply it
    async fn complete_listing(&self, axis: Axis, request: Option<ListingRequest>) {
        let Some(request) = request else {
            return;
        };
        let entries = fetch_listing(self.fs.as_ref(), &request).await;
        let applied = self.resolver(axis).lock().await.apply_listing(&request, entries);
        if !applied {
            debug!(
                "Listing of {} superseded for {}/{}",
                request.path.display(),
                axis.classification,
                axis.subtype
            );
        }
    }

    async fn build_snapshot(&self, axis: Axis) -> ProjectSnapshot {
        let resolver = self.resolver(axis).lock().await;
        ProjectSnapshot {
            project: self.name.clone(),
            classification: axis.classification.to_string(),
            subtype: axis.subtype.to_string(),
            dimension: resolver.dimension().to_string(),
            groups: resolver.groups(),
            directories: resolver.directories(),
            directories_order: resolver.directories_order(),
            file: resolver.selected_file().await,
        }
    }

    async fn publish(&self, axis: Axis) -> ProjectSnapshot {
        let snapshot = self.build_snapshot(axis).await;
        self.bus.emit_lossy(PulsarEvent::project_updated(snapshot.clone()));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{TaskBridge, TaskRequest};
    use pulsar_common::fs::LocalFs;
    use pulsar_common::Error;
    use tempfile::TempDir;

    struct RejectingBridge;

    impl TaskBridge for RejectingBridge {
        fn submit(&self, request: TaskRequest) -> Result<TaskHandle> {
            Err(Error::NotFound(format!("software for task {}", request.id)))
        }
    }

    fn open(root: &Path, bus: EventBus) -> Project {
        let deps = ResolverDeps::new(Arc::new(LocalFs), Arc::new(RejectingBridge));
        Project::open("demo", root, &ProjectLayout::default(), deps, bus)
    }

    #[tokio::test]
    async fn test_every_mutation_emits_snapshot() {
        let dir = TempDir::new().unwrap();
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let project = open(dir.path(), bus);

        let returned = project.select_axis(Classification::Shot, Subtype::Render).await.unwrap();

        match rx.recv().await.unwrap() {
            PulsarEvent::ProjectUpdated { snapshot, .. } => assert_eq!(snapshot, returned),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(returned.classification, "shot");
        assert_eq!(returned.subtype, "render");
        assert_eq!(returned.directories_order, ["sequence"]);
    }

    #[tokio::test]
    async fn test_set_classification_keeps_subtype() {
        let dir = TempDir::new().unwrap();
        let project = open(dir.path(), EventBus::new(8));

        project.set_subtype(Subtype::Texture).await.unwrap();
        let snapshot = project.set_classification(Classification::Shot).await.unwrap();

        assert_eq!(project.axis().await, Axis::new(Classification::Shot, Subtype::Texture));
        assert_eq!(snapshot.subtype, "texture");
    }

    #[tokio::test]
    async fn test_task_dispatch_failure_is_returned() {
        let dir = TempDir::new().unwrap();
        let file_dir = dir.path().join("asset/scene/Hero/model/hi");
        std::fs::create_dir_all(&file_dir).unwrap();
        std::fs::write(file_dir.join("hero.ma"), "").unwrap();
        let project = open(dir.path(), EventBus::new(8));

        project.get_data().await.unwrap();
        for (group, value) in [("asset", "Hero"), ("task", "model"), ("subtask", "hi"), ("file", "hero.ma")] {
            project.set_group_value(group, value).await.unwrap();
        }

        let result = project.exec_task("new", "maya", "open_file", Value::Null).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
