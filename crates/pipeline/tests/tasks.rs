//! `list` and `cleanup` against the fake node.

mod common;

use odm_core::{DataType, ProcessingRequest, RequestLayout, TaskStatus};
use odm_pipeline::ExitCode;
use odm_registry::{TaskRegistry, TaskTracker};

use common::{harness, request_dir, spawn_lake, spawn_node, Behaviour, SharedNode, REQUEST_ID};

async fn seeded() -> (common::Harness, SharedNode) {
    let (node_config, node) = spawn_node(Behaviour::default()).await;
    {
        let mut node = node.lock().unwrap();
        node.insert("a", "REQ-1_rgb", TaskStatus::Completed.code());
        node.insert("b", "REQ-1_thermal", TaskStatus::Failed.code());
        node.insert("c", "OTHER_rgb", TaskStatus::Running.code());
        node.insert("d", "not-ours", TaskStatus::Queued.code());
    }
    let (ckan_config, _) = spawn_lake().await;
    (harness(node_config, ckan_config), node)
}

fn uuids(tasks: &[odm_nodeodm::TaskInfo]) -> Vec<String> {
    let mut uuids: Vec<_> = tasks.iter().map(|t| t.uuid.clone()).collect();
    uuids.sort();
    uuids
}

#[tokio::test]
async fn list_filters_by_request_and_status() {
    let (h, _) = seeded().await;
    let processor = h.service.processor();

    assert_eq!(uuids(&processor.list_tasks(None, &[]).await.unwrap()), vec!["a", "b", "c", "d"]);
    assert_eq!(uuids(&processor.list_tasks(Some(REQUEST_ID), &[]).await.unwrap()), vec!["a", "b"]);
    assert_eq!(
        uuids(&processor.list_tasks(None, &[TaskStatus::Running, TaskStatus::Queued]).await.unwrap()),
        vec!["c", "d"]
    );
    assert_eq!(
        uuids(&processor.list_tasks(Some(REQUEST_ID), &[TaskStatus::Failed]).await.unwrap()),
        vec!["b"]
    );
}

#[tokio::test]
async fn list_command_succeeds_for_request_directory() {
    let dir = tempfile::tempdir().unwrap();
    request_dir(dir.path(), &[22002]);
    let (h, _) = seeded().await;

    assert_eq!(h.service.list_tasks(Some(dir.path()), &[]).await, ExitCode::Success);
    assert_eq!(h.service.list_tasks(Some(&dir.path().join("missing")), &[]).await, ExitCode::Failure);
}

#[tokio::test]
async fn dry_run_cleanup_removes_nothing() {
    let (h, node) = seeded().await;

    let count = h
        .service
        .processor()
        .clear_tasks(None, &[TaskStatus::Completed, TaskStatus::Failed], true)
        .await
        .unwrap();

    assert_eq!(count, 2);
    let node = node.lock().unwrap();
    assert!(node.removed.is_empty());
    assert_eq!(node.tasks.len(), 4);
}

#[tokio::test]
async fn cleanup_removes_tasks_and_registry_entries() {
    let dir = tempfile::tempdir().unwrap();
    request_dir(dir.path(), &[22002, 22001]);
    let registry_path = RequestLayout::new(dir.path()).registry_file();
    let mut registry = TaskRegistry::open(&registry_path, REQUEST_ID).unwrap();
    registry.record(TaskTracker::new("a", REQUEST_ID, DataType::Rgb));
    registry.record(TaskTracker::new("b", REQUEST_ID, DataType::Thermal));
    registry.save().unwrap();

    let (h, node) = seeded().await;
    let request = ProcessingRequest::from_dir(dir.path()).unwrap();

    let removed = h
        .service
        .processor()
        .clear_tasks(Some(&request), &[TaskStatus::Failed], false)
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(node.lock().unwrap().removed, vec!["b".to_string()]);

    let registry = TaskRegistry::open(&registry_path, REQUEST_ID).unwrap();
    assert!(registry.get("a").is_some());
    assert!(registry.get("b").is_none());
}

#[tokio::test]
async fn cleanup_command_without_filters_clears_everything() {
    let (h, node) = seeded().await;

    assert_eq!(h.service.cleanup_tasks(None, &[], false).await, ExitCode::Success);
    assert!(node.lock().unwrap().tasks.is_empty());
}
