//! Integration tests for the project orchestrator
//!
//! Tests cover:
//! - Axis switching reuses resolvers
//! - Project reset reproduces the top-level listing
//! - Creating and selecting a new asset
//! - Snapshot level invariant after every step
//! - Tag idempotency through the orchestrator
//! - Stale listings never overwrite newer state

use pulsar_common::events::{EventBus, ProjectSnapshot, PulsarEvent};
use pulsar_common::fs::LocalFs;
use pulsar_pm::layout::{Axis, Classification, Dimension, ProjectLayout, Subtype};
use pulsar_pm::project::Project;
use pulsar_pm::resolver::{fetch_listing, ResolverDeps, Scope};
use pulsar_pm::software::{TaskBridge, TaskHandle, TaskRequest};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: bridge that accepts every task and never resolves it
struct IdleBridge;

impl TaskBridge for IdleBridge {
    fn submit(&self, request: TaskRequest) -> pulsar_common::Result<TaskHandle> {
        Ok(TaskHandle::detached(request.id).0)
    }
}

/// Test helper: project tree with a few assets and shots
fn production_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for path in [
        "asset/scene/Hero/model/hi",
        "asset/scene/Hero/rig/main",
        "asset/scene/Villain/model/lo",
        "asset/render/Hero/lookdev",
        "shot/scene/sq010/sh0010/anim/block",
        "shot/scene/sq020/sh0100/light/key",
    ] {
        std::fs::create_dir_all(root.join(path)).unwrap();
    }
    std::fs::write(root.join("asset/scene/Hero/model/hi/hero_v001.ma"), "").unwrap();
    dir
}

fn open(root: &Path, bus: EventBus) -> Project {
    let deps = ResolverDeps::new(Arc::new(LocalFs), Arc::new(IdleBridge));
    Project::open("demo", root, &ProjectLayout::default(), deps, bus)
}

/// Test helper: a level is unset exactly when every deeper listing is empty
fn assert_level_invariant(snapshot: &ProjectSnapshot) {
    let order = &snapshot.directories_order;
    for (i, name) in order.iter().enumerate() {
        let deeper_empty = order[i + 1..].iter().all(|deeper| {
            snapshot
                .directories
                .get(deeper)
                .map_or(true, |listing| listing.is_empty())
        });
        if snapshot.groups[name].is_none() {
            assert!(deeper_empty, "unset level '{}' has deeper listings", name);
        }
    }
}

/// Test helper: dimension, values and listings held by one axis' resolver
async fn resolver_state(
    project: &Project,
    axis: Axis,
) -> (Dimension, BTreeMap<String, Option<String>>, BTreeMap<String, Vec<String>>) {
    let resolver = project.resolver(axis).lock().await;
    (resolver.dimension(), resolver.groups(), resolver.directories())
}

#[tokio::test]
async fn test_axis_detour_restores_previous_state() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));
    let asset_scene = Axis::new(Classification::Asset, Subtype::Scene);
    let shot_scene = Axis::new(Classification::Shot, Subtype::Scene);

    project.select_axis(Classification::Asset, Subtype::Scene).await.unwrap();
    project.set_dimension(Dimension::TwoD).await.unwrap();
    let before = project.get_data().await.unwrap();
    let asset_before = resolver_state(&project, asset_scene).await;

    let shot_first = project.set_classification(Classification::Shot).await.unwrap();
    let shot_state = resolver_state(&project, shot_scene).await;
    assert_eq!(shot_first.dimension, "3d");
    assert_eq!(shot_first.directories["sequence"], ["sq010", "sq020"]);

    project.set_subtype(Subtype::Render).await.unwrap();
    let after = project.select_axis(Classification::Asset, Subtype::Scene).await.unwrap();

    assert_eq!(after, before);
    assert_eq!(after.dimension, "2d");
    assert_eq!(after.directories_order, ["asset", "task"]);
    assert_eq!(resolver_state(&project, asset_scene).await, asset_before);

    // the shot side comes back exactly as first visited
    let shot_again = project.set_classification(Classification::Shot).await.unwrap();
    assert_eq!(shot_again, shot_first);
    assert_eq!(resolver_state(&project, shot_scene).await, shot_state);
}

#[tokio::test]
async fn test_switching_axis_leaves_other_resolvers_untouched() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));

    project.select_axis(Classification::Shot, Subtype::Scene).await.unwrap();
    project.set_group_value("sequence", "sq010").await.unwrap();
    let shot_axis = Axis::new(Classification::Shot, Subtype::Scene);
    let shot_generation = project.resolver(shot_axis).lock().await.generation();

    project.select_axis(Classification::Asset, Subtype::Scene).await.unwrap();
    project.set_group_value("asset", "Hero").await.unwrap();

    let shot = project.resolver(shot_axis).lock().await;
    assert_eq!(shot.generation(), shot_generation);
    assert_eq!(shot.groups()["sequence"].as_deref(), Some("sq010"));
}

#[tokio::test]
async fn test_project_reset_reproduces_top_listing() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));

    let opened = project.get_data().await.unwrap();
    assert_eq!(opened.directories["asset"], ["Hero", "Villain"]);

    project.set_group_value("asset", "Hero").await.unwrap();
    project.set_group_value("task", "model").await.unwrap();
    let reset = project.get_data().await.unwrap();

    assert_eq!(reset, opened);
}

#[tokio::test]
async fn test_hero_scenario() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("asset/scene")).unwrap();
    let project = open(dir.path(), EventBus::new(64));

    let snapshot = project.select_axis(Classification::Asset, Subtype::Scene).await.unwrap();
    assert!(snapshot.directories["asset"].is_empty());

    let snapshot = project.create_new_group_value("asset", "Hero").await.unwrap();
    assert!(dir.path().join("asset/scene/Hero").is_dir());
    assert!(snapshot.directories["asset"].contains(&"Hero".to_string()));
    assert_level_invariant(&snapshot);

    std::fs::create_dir_all(dir.path().join("asset/scene/Hero/model")).unwrap();
    let snapshot = project.set_group_value("asset", "Hero").await.unwrap();
    assert_eq!(snapshot.groups["asset"].as_deref(), Some("Hero"));
    assert_eq!(snapshot.directories["task"], ["model"]);
    assert_level_invariant(&snapshot);
}

#[tokio::test]
async fn test_navigation_to_file_keeps_invariant() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));
    project.get_data().await.unwrap();

    let mut snapshot = project.snapshot().await;
    for (group, value) in [
        ("asset", "Hero"),
        ("task", "model"),
        ("subtask", "hi"),
        ("file", "hero_v001.ma"),
    ] {
        snapshot = project.set_group_value(group, value).await.unwrap();
        assert_level_invariant(&snapshot);
    }

    assert_eq!(snapshot.file.name.as_deref(), Some("hero_v001.ma"));

    let reselected = project.set_group_value("asset", "Villain").await.unwrap();
    assert_eq!(reselected.groups["task"], None);
    assert!(reselected.file.is_empty());
    assert_level_invariant(&reselected);
}

#[tokio::test]
async fn test_tags_through_project() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));
    project.get_data().await.unwrap();
    for (group, value) in [
        ("asset", "Hero"),
        ("task", "model"),
        ("subtask", "hi"),
        ("file", "hero_v001.ma"),
    ] {
        project.set_group_value(group, value).await.unwrap();
    }

    project.save_tag("rough").await.unwrap();
    let snapshot = project.save_tag("rough").await.unwrap();
    assert_eq!(snapshot.file.tags, Some(vec!["rough".to_string()]));

    project.delete_tag("rough").await.unwrap();
    let snapshot = project.delete_tag("rough").await.unwrap();
    assert_eq!(snapshot.file.tags, Some(vec![]));

    project.save_comment("first pass").await.unwrap();
    let metadata = project.file_metadata().await.unwrap();
    assert_eq!(metadata.comments.len(), 1);
    assert_eq!(metadata.comments[0].text, "first pass");
}

#[tokio::test]
async fn test_stale_listing_does_not_overwrite() {
    let tree = production_tree();
    let project = open(tree.path(), EventBus::new(64));
    project.get_data().await.unwrap();
    let axis = project.axis().await;

    // listing of the top level still in flight while the user selects an asset
    let stale = {
        let mut resolver = project.resolver(axis).lock().await;
        resolver.clear_values(&Scope::Project).unwrap();
        resolver.set_search_dir(&Scope::Project).unwrap();
        resolver.begin_search().unwrap()
    };
    let snapshot = project.set_group_value("asset", "Villain").await.unwrap();

    let entries = fetch_listing(&LocalFs, &stale).await;
    let applied = project.resolver(axis).lock().await.apply_listing(&stale, entries);

    assert!(!applied);
    assert_eq!(project.snapshot().await, snapshot);
}

#[tokio::test]
async fn test_snapshots_are_broadcast_in_order() {
    let tree = production_tree();
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let project = open(tree.path(), bus);

    project.get_data().await.unwrap();
    project.set_group_value("asset", "Hero").await.unwrap();

    let mut selected = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PulsarEvent::ProjectUpdated { snapshot, .. } = event {
            selected.push(snapshot.groups["asset"].clone());
        }
    }
    assert_eq!(selected, [None, Some("Hero".to_string())]);
}
