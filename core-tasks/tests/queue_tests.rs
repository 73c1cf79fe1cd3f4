//! Integration tests for the TaskQueue
//!
//! These tests verify:
//! - Callers that check by name never run two tasks under one name
//! - Tag cancellation reaches exactly the tasks carrying the tag
//! - The queue drains to zero once every task settles
//! - Failures, panics and cancellations settle with the right outcome

use core_runtime::events::{CoreEvent, EventBus, TaskEvent};
use core_tasks::{Task, TaskError, TaskOutcome, TaskQueue, TaskState};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

fn interrupted() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "cancelled")
}

/// Body that runs until its task is cancelled.
async fn until_cancelled(task: Task) -> Result<(), io::Error> {
    task.cancelled().await;
    Err(interrupted())
}

#[tokio::test]
async fn test_dedup_by_name_when_caller_checks_first() {
    let queue = TaskQueue::new();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        if queue.find_by_name("sync:spotify").is_some() {
            continue;
        }
        let running = running.clone();
        let peak = peak.clone();
        queue.enqueue("sync:spotify", "sync:spotify", move |task| async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            task.cancelled().await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        });
    }

    assert_eq!(queue.find_all_by_tag("sync:spotify").len(), 1);
    queue.cancel_all();
    queue.wait_for_all().await;
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_enqueue_unique_concurrent_callers() {
    let queue = TaskQueue::new();
    let started = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let queue = queue.clone();
        let started = started.clone();
        handles.push(tokio::spawn(async move {
            queue
                .enqueue_unique("sync:all", "sync", move |task| async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    until_cancelled(task).await
                })
                .is_new()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(queue.task_count(), 1);

    queue.cancel_all();
    queue.wait_for_all().await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_by_tag_reaches_exactly_tagged_tasks() {
    let queue = TaskQueue::new();
    let tagged: Vec<Task> = (0..5)
        .map(|i| queue.enqueue(format!("a{i}"), "providerA", until_cancelled))
        .collect();
    let other = queue.enqueue("b0", "providerB", until_cancelled);

    assert_eq!(queue.cancel_by_tag("providerA"), 5);
    queue.wait_for_tag("providerA").await;

    for task in &tagged {
        assert!(task.state().is_terminal());
        assert_eq!(task.state(), TaskState::Cancelled);
    }
    assert!(queue
        .find_all_by_tag("providerA")
        .iter()
        .all(|task| task.state().is_terminal()));
    assert!(queue.find_by_tag("providerA").is_none());

    assert!(!other.is_cancelled());
    assert!(other.state().is_active());

    queue.cancel_by_tags(["providerB", "providerC"]);
    assert!(other.wait().await.is_cancelled());
}

#[tokio::test]
async fn test_queue_drains_after_settlement() {
    let queue = TaskQueue::new();
    let (release, gate) = watch::channel(false);

    for i in 0..4 {
        let mut gate = gate.clone();
        queue.enqueue(format!("job{i}"), "batch", move |_| async move {
            let _ = gate.wait_for(|open| *open).await;
            Ok::<_, io::Error>(())
        });
    }
    assert_eq!(queue.task_count(), 4);

    release.send_replace(true);
    queue.wait_for_tag("batch").await;

    assert_eq!(queue.task_count(), 0);
    assert!(queue.find_by_name("job0").is_none());
    assert!(queue.find_by_tag("batch").is_none());
}

#[tokio::test]
async fn test_wait_ignores_tasks_enqueued_later() {
    let queue = TaskQueue::new();
    queue.enqueue("first", "t", |_| async { Ok::<_, io::Error>(()) });
    let waiting = queue.wait_for_all();

    let late = queue.enqueue("late", "t", until_cancelled);
    tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("snapshot wait should not include the late task");

    assert!(late.state().is_active());
    late.cancel();
    late.wait().await;
}

#[tokio::test]
async fn test_wait_on_empty_queue_returns_immediately() {
    let queue = TaskQueue::new();
    tokio::time::timeout(Duration::from_millis(100), queue.wait_for_all())
        .await
        .unwrap();
    queue.wait_for_tag("nothing").await;
}

#[tokio::test]
async fn test_failure_keeps_body_error() {
    let queue = TaskQueue::new();
    let task = queue.enqueue("fails", "t", |_| async {
        Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "bad credentials"))
    });

    let outcome = task.wait().await;
    assert_eq!(outcome.state(), TaskState::Failed);
    let error = outcome
        .error()
        .and_then(|e| e.downcast_ref::<io::Error>())
        .unwrap();
    assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_completion_after_cancel_request_counts_as_completed() {
    let queue = TaskQueue::new();
    let task = queue.enqueue("finishes", "t", |task| async move {
        task.cancelled().await;
        Ok::<_, io::Error>(())
    });
    task.cancel();
    assert!(task.wait().await.is_completed());
}

#[tokio::test]
async fn test_panicking_body_settles_as_failed() {
    let queue = TaskQueue::new();
    let task = queue.enqueue("panics", "t", |_| async {
        if true {
            panic!("body exploded");
        }
        Ok::<_, io::Error>(())
    });

    let outcome = task.wait().await;
    let error = outcome
        .error()
        .and_then(|e| e.downcast_ref::<TaskError>())
        .cloned();
    assert_eq!(
        error,
        Some(TaskError::Panicked {
            name: "panics".to_string(),
            message: "body exploded".to_string(),
        })
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_status_updates_are_observable() {
    let queue = TaskQueue::new();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let task = queue.enqueue("reports", "t", move |task| async move {
        task.set_status(0.25, "page 1");
        release.notified().await;
        task.set_status(1.0, "done");
        Ok::<_, io::Error>(())
    });

    let mut status = task.subscribe_status();
    status
        .wait_for(|status| status.text == "page 1")
        .await
        .unwrap();
    assert_eq!(task.status().progress, 0.25);

    gate.notify_one();
    task.wait().await;
    assert_eq!(task.status().text, "done");
}

#[tokio::test]
async fn test_task_events_published() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let queue = TaskQueue::with_event_bus(bus);

    let task = queue.enqueue("evented", "t", |_| async { Ok::<_, io::Error>(()) });
    task.wait().await;

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Task(TaskEvent::Enqueued {
            task_id: task.id().as_str(),
            name: "evented".to_string(),
            tag: "t".to_string(),
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Task(TaskEvent::Settled {
            task_id: task.id().as_str(),
            name: "evented".to_string(),
            tag: "t".to_string(),
            state: "completed".to_string(),
        })
    );
}

#[tokio::test]
async fn test_outcome_is_shared_by_all_handles() {
    let queue = TaskQueue::new();
    let task = queue.enqueue("shared", "t", until_cancelled);
    let found = queue.find_by_name("shared").unwrap();
    assert!(found.ptr_eq(&task));

    found.cancel();
    let outcomes = wait_each(&[task.clone(), found]).await;
    assert!(outcomes.iter().all(TaskOutcome::is_cancelled));
}

async fn wait_each(tasks: &[Task]) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.wait().await);
    }
    outcomes
}
