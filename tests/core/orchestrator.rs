use pincer::core::error::PincerError;
use pincer::core::journal::Journal;
use pincer::core::model::{Agent, AgentStatus, Priority, TaskDef, TaskRef, TaskStatus};
use pincer::core::orchestrator::{AdvanceOutcome, Orchestrator};
use pincer::core::pool::AgentPool;
use pincer::core::store::{JsonFileStore, MemoryStore, StateSnapshot, WorkflowStore};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

fn pool(agents: &[(&str, &str)]) -> AgentPool {
    let roster: Vec<Agent> = agents
        .iter()
        .map(|(id, cap)| Agent::new(id, id, cap, 1.0))
        .collect();
    AgentPool::new(roster.len().max(1), roster).unwrap()
}

fn file_backed(path: &Path, roster: &[(&str, &str)]) -> Orchestrator {
    Orchestrator::open(Box::new(JsonFileStore::open(path).unwrap()), pool(roster)).unwrap()
}

fn w1_tasks() -> Vec<TaskDef> {
    vec![
        TaskDef::new("A", "schema", "backend", &[]),
        TaskDef::new("B", "api", "backend", &["A"]),
        TaskDef::new("C", "ui", "backend", &["A"]),
    ]
}

#[test]
fn test_w1_walkthrough() {
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend")])).unwrap();
    o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();

    // B waits on A.
    let r = o.validate_dependencies("W1", "B").unwrap();
    assert!(!r.ready);
    assert_eq!(r.reason, "dependency 'A' is PENDING");
    assert!(matches!(o.advance("W1", "B").unwrap(), AdvanceOutcome::NotReady { .. }));

    assert_eq!(
        o.advance("W1", "A").unwrap(),
        AdvanceOutcome::Dispatched { agent_id: "be-1".to_string() }
    );
    o.complete_task("W1", "A", vec!["schema.sql".to_string()]).unwrap();

    assert!(o.validate_dependencies("W1", "B").unwrap().ready);
    assert!(o.validate_dependencies("W1", "C").unwrap().ready);

    assert!(o.advance("W1", "B").unwrap().is_dispatched());
    // Only one backend agent: C has to wait.
    assert_eq!(
        o.advance("W1", "C").unwrap(),
        AdvanceOutcome::NoAgentAvailable { capability: "backend".to_string() }
    );
    o.complete_task("W1", "B", vec![]).unwrap();
    assert!(o.advance("W1", "C").unwrap().is_dispatched());
    o.complete_task("W1", "C", vec![]).unwrap();

    let status = o.get_status("W1").unwrap();
    assert_eq!(status.counts.completed, 3);
    assert!(status.tasks.iter().all(|t| t.completed_at.is_some()));
    let agent = &status.agents[0];
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.completed_count, 3);
    assert_eq!(agent.current_task, None);
}

#[test]
fn test_w1_parallel_wave_with_two_agents() {
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend"), ("be-2", "backend")])).unwrap();
    o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();
    o.advance("W1", "A").unwrap();
    o.complete_task("W1", "A", vec![]).unwrap();

    let b = o.advance("W1", "B").unwrap();
    let c = o.advance("W1", "C").unwrap();
    assert_eq!(b, AdvanceOutcome::Dispatched { agent_id: "be-1".to_string() });
    assert_eq!(c, AdvanceOutcome::Dispatched { agent_id: "be-2".to_string() });
    o.complete_task("W1", "B", vec!["api.rs".to_string()]).unwrap();
    o.complete_task("W1", "C", vec!["ui.tsx".to_string()]).unwrap();

    let record = o
        .generate_evidence("W1", &["B".to_string(), "C".to_string()], None)
        .unwrap();
    assert_eq!(record.tasks.len(), 2);
    assert!(record.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert_eq!(record.tasks[0].agent_id.as_deref(), Some("be-1"));
    assert_eq!(record.tasks[1].agent_id.as_deref(), Some("be-2"));
    assert_eq!(record.tasks[1].deliverables, vec!["ui.tsx"]);
}

#[test]
fn test_dependents_of_failed_task_stay_blocked() {
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend")])).unwrap();
    o.start_workflow("W1", "web", Priority::Medium, w1_tasks()).unwrap();
    o.advance("W1", "A").unwrap();
    o.fail_task("W1", "A", "tests red").unwrap();

    for dependent in ["B", "C"] {
        match o.advance("W1", dependent).unwrap() {
            AdvanceOutcome::NotReady { reason } => assert!(reason.contains("FAILED")),
            other => panic!("expected NotReady, got {:?}", other),
        }
    }
    o.retry_task("W1", "A").unwrap();
    assert!(o.advance("W1", "A").unwrap().is_dispatched());
}

#[test]
fn test_rejected_definitions() {
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend")])).unwrap();
    let cyclic = vec![
        TaskDef::new("A", "a", "backend", &["C"]),
        TaskDef::new("B", "b", "backend", &["A"]),
        TaskDef::new("C", "c", "backend", &["B"]),
    ];
    assert!(matches!(
        o.start_workflow("W", "d", Priority::Low, cyclic),
        Err(PincerError::DependencyCycle(_))
    ));
    let dup = vec![
        TaskDef::new("A", "a", "backend", &[]),
        TaskDef::new("A", "again", "backend", &[]),
    ];
    assert!(matches!(
        o.start_workflow("W", "d", Priority::Low, dup),
        Err(PincerError::DuplicateTask(_))
    ));
    assert!(matches!(
        o.start_workflow("bad id", "d", Priority::Low, vec![]),
        Err(PincerError::ValidationError(_))
    ));
    assert!(o.list_workflows().unwrap().is_empty());
}

#[test]
fn test_concurrent_advance_never_double_assigns() {
    for _ in 0..25 {
        let o = Arc::new(Orchestrator::in_memory(pool(&[("be-1", "backend")])).unwrap());
        o.start_workflow(
            "W",
            "d",
            Priority::Medium,
            vec![
                TaskDef::new("X", "x", "backend", &[]),
                TaskDef::new("Y", "y", "backend", &[]),
            ],
        )
        .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["X", "Y"]
            .into_iter()
            .map(|task| {
                let o = Arc::clone(&o);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    o.advance("W", task).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<AdvanceOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let dispatched = outcomes.iter().filter(|r| r.is_dispatched()).count();
        let starved = outcomes
            .iter()
            .filter(|r| matches!(r, AdvanceOutcome::NoAgentAvailable { .. }))
            .count();
        assert_eq!(dispatched, 1, "{:?}", outcomes);
        assert_eq!(starved, 1, "{:?}", outcomes);

        let wf = o.workflow("W").unwrap();
        let running: Vec<_> = wf
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .collect();
        assert_eq!(running.len(), 1);
        let agent = &o.agents().unwrap()[0];
        assert_eq!(agent.current_task, Some(TaskRef::new("W", &running[0].id)));
    }
}

#[test]
fn test_concurrent_advance_of_same_task_dispatches_once() {
    let o = Arc::new(
        Orchestrator::in_memory(pool(&[("be-1", "backend"), ("be-2", "backend")])).unwrap(),
    );
    o.start_workflow("W", "d", Priority::Medium, vec![TaskDef::new("X", "x", "backend", &[])])
        .unwrap();
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let o = Arc::clone(&o);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                o.advance("W", "X")
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| matches!(r, Ok(AdvanceOutcome::Dispatched { .. }))).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(PincerError::InvalidTransition { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(rejected, 3);
    let working = o
        .agents()
        .unwrap()
        .iter()
        .filter(|a| a.status == AgentStatus::Working)
        .count();
    assert_eq!(working, 1);
}

#[test]
fn test_state_survives_restart() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("data").join("workflows.json");
    let roster = [("be-1", "backend"), ("fe-1", "frontend")];

    {
        let o = file_backed(&path, &roster);
        o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();
        o.advance("W1", "A").unwrap();
    }

    let o = file_backed(&path, &roster);
    let wf = o.workflow("W1").unwrap();
    assert_eq!(wf.task_ids(), vec!["A", "B", "C"]);
    assert_eq!(wf.task("A").unwrap().status, TaskStatus::Running);
    let agents = o.agents().unwrap();
    assert_eq!(agents[0].current_task, Some(TaskRef::new("W1", "A")));

    o.complete_task("W1", "A", vec![]).unwrap();
    assert_eq!(o.ready_tasks("W1").unwrap(), vec!["B", "C"]);
}

#[test]
fn test_restart_with_roster_missing_busy_agent_fails() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("workflows.json");
    {
        let o = file_backed(&path, &[("be-1", "backend")]);
        o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();
        o.advance("W1", "A").unwrap();
    }
    let result = Orchestrator::open(
        Box::new(JsonFileStore::open(&path).unwrap()),
        pool(&[("be-9", "backend")]),
    );
    assert!(matches!(result, Err(PincerError::ConfigError(_))));
}

#[test]
fn test_separate_owners_of_one_state_file_never_share_an_agent() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("data").join("workflows.json");
    let roster = [("be-1", "backend")];
    file_backed(&path, &roster)
        .start_workflow(
            "W",
            "d",
            Priority::Medium,
            vec![
                TaskDef::new("X", "x", "backend", &[]),
                TaskDef::new("Y", "y", "backend", &[]),
            ],
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["X", "Y"]
        .into_iter()
        .map(|task| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Each owner loads, advances and saves on its own, like two CLI runs.
                let o = file_backed(&path, &roster);
                o.advance("W", task).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<AdvanceOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|r| r.is_dispatched()).count(), 1, "{:?}", outcomes);

    let o = file_backed(&path, &roster);
    let wf = o.workflow("W").unwrap();
    let running: Vec<&str> = wf
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Running)
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(running.len(), 1);
    assert_eq!(
        o.agents().unwrap()[0].current_task,
        Some(TaskRef::new("W", running[0]))
    );
}

/// Store whose writes can be switched off.
struct FlakyStore {
    inner: MemoryStore,
    broken: Arc<AtomicBool>,
}

impl WorkflowStore for FlakyStore {
    fn load(&self) -> Result<StateSnapshot, PincerError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), PincerError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PincerError::IoError(std::io::Error::other("disk full")));
        }
        self.inner.save(snapshot)
    }
}

#[test]
fn test_failed_save_leaves_memory_at_last_commit() {
    let broken = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: MemoryStore::new(),
        broken: Arc::clone(&broken),
    };
    let o = Orchestrator::open(Box::new(store), pool(&[("be-1", "backend")])).unwrap();
    o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();
    let before = o.workflow("W1").unwrap();

    broken.store(true, Ordering::SeqCst);
    assert!(matches!(o.advance("W1", "A"), Err(PincerError::IoError(_))));
    assert_eq!(o.workflow("W1").unwrap(), before);
    assert!(o.agents().unwrap()[0].is_idle());

    broken.store(false, Ordering::SeqCst);
    assert!(o.advance("W1", "A").unwrap().is_dispatched());
}

#[test]
fn test_journal_records_committed_transitions_only() {
    let tmp = tempdir().unwrap();
    let journal = Journal::new(tmp.path().join("events.jsonl"));
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend")]))
        .unwrap()
        .with_journal(journal.clone())
        .with_actor("planner");
    o.start_workflow("W1", "web", Priority::High, w1_tasks()).unwrap();
    o.advance("W1", "B").unwrap(); // not ready: no event
    o.advance("W1", "A").unwrap();
    o.complete_task("W1", "A", vec![]).unwrap();

    let events = journal.tail(10).unwrap();
    let ops: Vec<&str> = events.iter().map(|e| e.op.as_str()).collect();
    assert_eq!(ops, vec!["workflow.start", "task.advance", "task.complete"]);
    assert!(events.iter().all(|e| e.actor == "planner"));
    assert_eq!(events[1].agent_id.as_deref(), Some("be-1"));
}

#[test]
fn test_evidence_for_wave() {
    let o = Orchestrator::in_memory(pool(&[("be-1", "backend"), ("fe-1", "frontend")])).unwrap();
    o.start_workflow(
        "APP",
        "mobile",
        Priority::High,
        vec![
            TaskDef::new("1", "setup", "backend", &[]),
            TaskDef::new("2.1", "api", "backend", &["1"]),
            TaskDef::new("2.2", "screens", "frontend", &["1"]),
        ],
    )
    .unwrap();
    o.advance("APP", "1").unwrap();
    o.complete_task("APP", "1", vec![]).unwrap();
    o.advance("APP", "2.1").unwrap();
    o.advance("APP", "2.2").unwrap();
    o.complete_task("APP", "2.1", vec!["openapi.yaml".to_string()]).unwrap();

    let record = o.generate_evidence("APP", &[], Some("2")).unwrap();
    let ids: Vec<&str> = record.tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["2.1", "2.2"]);
    assert_eq!(record.tasks[0].deliverables, vec!["openapi.yaml"]);
    assert_eq!(record.tasks[1].status, TaskStatus::Running);
    assert_eq!(record.metrics.counts.completed, 1);
    assert_eq!(record.metrics.counts.running, 1);
    assert!(record.verify().unwrap());
}
