use crate::dispatcher::RoleDispatcher;
use crate::graph::TaskGraph;
use crate::inbox::MessageInbox;
use crate::state::{RunState, TaskReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use troupe_agent::{Collected, ResponseCollector};
use troupe_blackboard::Blackboard;
use troupe_core::{
    AgentRole, ExecutionMode, ExecutionStrategy, MessageHandling, RunContext, SupervisorPlan,
    Task, TaskStatus, TroupeError, TroupeResult,
};
use uuid::Uuid;

/// Overall outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task completed.
    Completed,
    /// At least one task completed, but not all.
    Degraded,
    /// No task completed.
    Failed,
    /// The run was cancelled before finishing.
    Cancelled,
    /// The supervisor declined to proceed; only the greeting was emitted.
    Declined,
}

/// Events on a run's live output channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The plan's greeting, emitted before execution.
    Greeting {
        /// Greeting text.
        text: String,
    },
    /// A task entered Running.
    TaskStarted {
        /// Task id.
        task_id: String,
    },
    /// Streamed output from a STREAMING task, forwarded as produced.
    TaskDelta {
        /// Task id.
        task_id: String,
        /// Incremental text.
        text: String,
    },
    /// A task completed.
    TaskCompleted {
        /// Task id.
        task_id: String,
    },
    /// A task failed.
    TaskFailed {
        /// Task id.
        task_id: String,
        /// Failure reason.
        error: String,
    },
    /// A task was skipped because a dependency did not complete.
    TaskSkipped {
        /// Task id.
        task_id: String,
    },
    /// A task was cancelled.
    TaskCancelled {
        /// Task id.
        task_id: String,
    },
    /// The run reached its terminal status.
    RunFinished {
        /// Final run status.
        status: RunStatus,
    },
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run id.
    pub run_id: Uuid,
    /// Overall outcome.
    pub status: RunStatus,
    /// The plan's greeting.
    pub greeting: String,
    /// Per-task terminal statuses, in plan order.
    pub tasks: Vec<TaskReport>,
    /// One-line human-readable summary.
    pub summary: String,
}

/// Per-run wiring handed to [`Orchestrator::run`].
pub struct RunIo {
    /// The run's blackboard.
    pub board: Arc<Blackboard>,
    /// Queue of mid-run user messages.
    pub inbox: Arc<MessageInbox>,
    /// Live output channel.
    pub events: mpsc::UnboundedSender<RunEvent>,
    /// Cooperative cancellation for the whole run.
    pub cancel: CancellationToken,
}

/// Everything a spawned task execution needs, shared across the run.
struct Shared {
    collector: ResponseCollector,
    dispatcher: Arc<RoleDispatcher>,
    board: Arc<Blackboard>,
    state: RwLock<RunState>,
    events: mpsc::UnboundedSender<RunEvent>,
    cancel: CancellationToken,
    policy: MessageHandling,
    user_message: String,
}

/// The scheduling engine: executes a validated plan under its execution
/// mode.
///
/// Tasks are dispatched only once every `fromTask` dependency is Completed;
/// a failed or skipped dependency cascades Skipped through its dependents
/// while independent branches keep running. Task-level failures never unwind
/// the run.
pub struct Orchestrator {
    dispatcher: Arc<RoleDispatcher>,
    collector: ResponseCollector,
}

impl Orchestrator {
    /// Engine over the given worker table, with the default collection
    /// deadline.
    pub fn new(dispatcher: Arc<RoleDispatcher>) -> Self {
        Self {
            dispatcher,
            collector: ResponseCollector::default(),
        }
    }

    /// Replace the response collector (custom deadline).
    pub fn with_collector(mut self, collector: ResponseCollector) -> Self {
        self.collector = collector;
        self
    }

    /// Execute `plan` for one run.
    ///
    /// Graph-level errors abort before any task is dispatched and surface as
    /// `Err`; task-level errors are folded into the report.
    pub async fn run(
        &self,
        ctx: &RunContext,
        plan: SupervisorPlan,
        user_message: &str,
        io: RunIo,
    ) -> TroupeResult<RunReport> {
        let run_id = ctx.run_id;
        info!(
            run_id = %run_id,
            caller = %ctx.caller,
            mode = ?plan.execution_mode,
            task_count = plan.tasks.len(),
            "run starting"
        );

        if !plan.should_proceed {
            info!(run_id = %run_id, "supervisor declined to proceed");
            let _ = io.events.send(RunEvent::Greeting {
                text: plan.greeting.clone(),
            });
            let _ = io.events.send(RunEvent::RunFinished {
                status: RunStatus::Declined,
            });
            let state = RunState::new(&plan.tasks);
            return Ok(RunReport {
                run_id,
                status: RunStatus::Declined,
                greeting: plan.greeting.clone(),
                tasks: state.reports(&plan.tasks),
                summary: "supervisor declined; no tasks executed".to_string(),
            });
        }

        let graph = TaskGraph::from_plan(&plan);
        graph.validate()?;

        if !plan.greeting.is_empty() {
            let _ = io.events.send(RunEvent::Greeting {
                text: plan.greeting.clone(),
            });
        }

        let shared = Arc::new(Shared {
            collector: self.collector,
            dispatcher: self.dispatcher.clone(),
            board: io.board.clone(),
            state: RwLock::new(RunState::new(&plan.tasks)),
            events: io.events.clone(),
            cancel: io.cancel.clone(),
            policy: plan.message_handling,
            user_message: user_message.to_string(),
        });

        match plan.execution_mode {
            ExecutionMode::Serial => self.run_serial(&graph, &shared, &io.inbox).await?,
            ExecutionMode::Parallel => {
                let extra = Arc::new(drain_boundary(&shared, &io.inbox));
                self.run_concurrent(&graph.parallel_batch(), &shared, extra)
                    .await?;
            }
            ExecutionMode::Hybrid => {
                for group in graph.hybrid_groups() {
                    if shared.cancel.is_cancelled() {
                        break;
                    }
                    let extra = Arc::new(drain_boundary(&shared, &io.inbox));
                    self.run_concurrent(&group, &shared, extra).await?;
                }
            }
        }

        self.finish(run_id, &plan, &graph, &shared, &io).await
    }

    /// SERIAL: one task at a time in `order` ascending; the boundary before
    /// each step drains the inbox.
    async fn run_serial(
        &self,
        graph: &TaskGraph,
        shared: &Arc<Shared>,
        inbox: &MessageInbox,
    ) -> TroupeResult<()> {
        for task in graph.serial_sequence() {
            if shared.cancel.is_cancelled() {
                break;
            }

            let unmet = {
                let state = shared.state.read().await;
                task.inputs
                    .from_task
                    .iter()
                    .find(|dep| !state.is_completed(dep))
                    .cloned()
            };
            if let Some(dep) = unmet {
                skip_task(shared, task, &dep).await;
                continue;
            }

            // Queued messages fold into the next step that actually runs.
            let extra = Arc::new(drain_boundary(shared, inbox));
            execute_task(shared.clone(), task.clone(), extra).await;
        }
        Ok(())
    }

    /// Dependency-resolution waves over `scope`: every Pending task whose
    /// dependencies are all Completed is spawned; the wave is awaited; skips
    /// cascade between waves. Used for the PARALLEL batch and each HYBRID
    /// group.
    async fn run_concurrent(
        &self,
        scope: &[&Task],
        shared: &Arc<Shared>,
        extra: Arc<Vec<String>>,
    ) -> TroupeResult<()> {
        loop {
            if shared.cancel.is_cancelled() {
                return Ok(());
            }

            let (ready, skipped) = {
                let state = shared.state.read().await;
                let mut ready: Vec<Task> = Vec::new();
                let mut skipped: Vec<(Task, String)> = Vec::new();
                for task in scope {
                    if state.status(&task.id) != Some(TaskStatus::Pending) {
                        continue;
                    }
                    let mut dead_dep = None;
                    let mut satisfied = true;
                    for dep in &task.inputs.from_task {
                        match state.status(dep) {
                            Some(TaskStatus::Completed) => {}
                            Some(
                                TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled,
                            ) => {
                                dead_dep = Some(dep.clone());
                                break;
                            }
                            _ => satisfied = false,
                        }
                    }
                    if let Some(dep) = dead_dep {
                        skipped.push(((*task).clone(), dep));
                    } else if satisfied {
                        ready.push((*task).clone());
                    }
                }
                (ready, skipped)
            };

            let had_skips = !skipped.is_empty();
            for (task, dep) in skipped {
                skip_task(shared, &task, &dep).await;
            }

            if ready.is_empty() {
                if had_skips {
                    // Skips can cascade; re-evaluate the scope.
                    continue;
                }
                let pending_left = {
                    let state = shared.state.read().await;
                    scope
                        .iter()
                        .any(|t| state.status(&t.id) == Some(TaskStatus::Pending))
                };
                if pending_left {
                    return Err(TroupeError::TaskExecution(
                        "task deadlock: pending tasks with unmet dependencies".to_string(),
                    ));
                }
                return Ok(());
            }

            let mut wave = JoinSet::new();
            for task in ready {
                let shared = shared.clone();
                let extra = extra.clone();
                wave.spawn(async move { execute_task(shared, task, extra).await });
            }
            while let Some(joined) = wave.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "task join failed");
                }
            }
        }
    }

    /// Terminal bookkeeping: cancel leftovers, flush the inbox, compute the
    /// run status, and emit the summary.
    async fn finish(
        &self,
        run_id: Uuid,
        plan: &SupervisorPlan,
        graph: &TaskGraph,
        shared: &Arc<Shared>,
        io: &RunIo,
    ) -> TroupeResult<RunReport> {
        if shared.cancel.is_cancelled() {
            let mut state = shared.state.write().await;
            for task in graph.tasks() {
                if state.status(&task.id) == Some(TaskStatus::Pending) {
                    state.mark_cancelled(&task.id);
                    let _ = shared.events.send(RunEvent::TaskCancelled {
                        task_id: task.id.clone(),
                    });
                }
            }
        }

        let leftover = io.inbox.drain();
        if !leftover.is_empty() {
            shared.board.append_message(
                None,
                AgentRole::Supervisor,
                "unhandled",
                format!(
                    "{} user message(s) arrived after the last dispatch boundary",
                    leftover.len()
                ),
                HashMap::new(),
            );
        }

        let state = shared.state.read().await;
        let total = graph.len();
        let completed = state.count(TaskStatus::Completed);
        let failed = state.count(TaskStatus::Failed);
        let skipped = state.count(TaskStatus::Skipped);
        let cancelled = state.count(TaskStatus::Cancelled);

        let status = if cancelled > 0 {
            RunStatus::Cancelled
        } else if completed == total {
            RunStatus::Completed
        } else if completed > 0 {
            RunStatus::Degraded
        } else {
            RunStatus::Failed
        };

        let summary = format!(
            "{completed}/{total} tasks completed, {failed} failed, {skipped} skipped, {cancelled} cancelled"
        );
        shared.board.append_message(
            None,
            AgentRole::Supervisor,
            "run",
            &summary,
            HashMap::new(),
        );
        let _ = shared.events.send(RunEvent::RunFinished { status });
        info!(run_id = %run_id, status = ?status, %summary, "run finished");

        Ok(RunReport {
            run_id,
            status,
            greeting: plan.greeting.clone(),
            tasks: state.reports(graph.tasks()),
            summary,
        })
    }
}

/// Drain the inbox at a dispatch boundary and apply the message policy.
///
/// AUTO returns the messages for folding into the next input context;
/// IGNORE logs each as discarded and returns nothing.
fn drain_boundary(shared: &Shared, inbox: &MessageInbox) -> Vec<String> {
    let queued = inbox.drain();
    if queued.is_empty() {
        return queued;
    }
    match shared.policy {
        MessageHandling::Auto => {
            info!(
                count = queued.len(),
                "folding queued user messages into next input context"
            );
            queued
        }
        MessageHandling::Ignore => {
            for message in queued {
                shared.board.append_message(
                    None,
                    AgentRole::Supervisor,
                    "discarded",
                    message,
                    HashMap::new(),
                );
            }
            Vec::new()
        }
    }
}

/// Mark a task Skipped because `dep` did not complete, with log and event.
async fn skip_task(shared: &Shared, task: &Task, dep: &str) {
    shared.state.write().await.mark_skipped(&task.id);
    let role = shared
        .dispatcher
        .role_of(&task.agent_id)
        .unwrap_or(AgentRole::Worker);
    shared.board.append_message(
        Some(&task.id),
        role,
        "skipped",
        format!("dependency '{dep}' did not complete"),
        HashMap::new(),
    );
    let _ = shared.events.send(RunEvent::TaskSkipped {
        task_id: task.id.clone(),
    });
    info!(task_id = %task.id, dependency = %dep, "task skipped");
}

/// Run one task end to end: dispatch, prompt assembly, stream collection,
/// blackboard writes, status transition. Never panics and never returns an
/// error — failure is recorded against the task.
async fn execute_task(shared: Arc<Shared>, task: Task, extra: Arc<Vec<String>>) {
    shared.state.write().await.mark_running(&task.id);
    let _ = shared.events.send(RunEvent::TaskStarted {
        task_id: task.id.clone(),
    });
    info!(
        task_id = %task.id,
        agent_id = %task.agent_id,
        strategy = ?task.execution_strategy,
        "task running"
    );

    let role = shared
        .dispatcher
        .role_of(&task.agent_id)
        .unwrap_or(AgentRole::Worker);

    let outcome = tokio::select! {
        _ = shared.cancel.cancelled() => {
            warn!(task_id = %task.id, "task cancelled in flight");
            shared.state.write().await.mark_cancelled(&task.id);
            shared.board.append_message(
                Some(&task.id),
                role,
                "cancelled",
                "run cancelled while task in flight",
                HashMap::new(),
            );
            let _ = shared.events.send(RunEvent::TaskCancelled {
                task_id: task.id.clone(),
            });
            return;
        }
        outcome = run_worker(&shared, &task, &extra) => outcome,
    };

    match outcome {
        Ok(collected) => {
            let mut meta = HashMap::new();
            if let Collected::Complete {
                usage: Some(usage), ..
            } = &collected
            {
                meta.insert("input_tokens".to_string(), usage.input_tokens.to_string());
                meta.insert("output_tokens".to_string(), usage.output_tokens.to_string());
            }
            if collected.is_partial() {
                meta.insert("partial".to_string(), "true".to_string());
            }
            let text = collected.into_text();

            shared.board.put(task.id.clone(), text.clone());
            for output in &task.outputs {
                shared
                    .board
                    .put(format!("{}.{output}", task.id), text.clone());
            }
            shared
                .board
                .append_message(Some(&task.id), role, "result", &text, meta);

            shared.state.write().await.mark_completed(&task.id);
            let _ = shared.events.send(RunEvent::TaskCompleted {
                task_id: task.id.clone(),
            });
            info!(task_id = %task.id, "task completed");
        }
        Err(e) => {
            error!(task_id = %task.id, error = %e, "task failed");
            shared.board.append_message(
                Some(&task.id),
                role,
                "error",
                e.to_string(),
                HashMap::new(),
            );
            shared.state.write().await.mark_failed(&task.id, e.to_string());
            let _ = shared.events.send(RunEvent::TaskFailed {
                task_id: task.id.clone(),
                error: e.to_string(),
            });
        }
    }
}

/// Dispatch the worker and collect its stream per the task's strategy.
async fn run_worker(shared: &Shared, task: &Task, extra: &[String]) -> TroupeResult<Collected> {
    let (_, responder) = shared.dispatcher.lookup(&task.agent_id)?;
    let prompt = assemble_prompt(task, &shared.user_message, extra, &shared.board);
    let mut handle = responder.respond(&prompt).await?;

    match task.execution_strategy {
        ExecutionStrategy::Silent => shared.collector.collect(&mut handle).await,
        ExecutionStrategy::Streaming => {
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            let events = shared.events.clone();
            let task_id = task.id.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(text) = rx.recv().await {
                    let _ = events.send(RunEvent::TaskDelta {
                        task_id: task_id.clone(),
                        text,
                    });
                }
            });
            let collected = shared.collector.collect_forwarding(&mut handle, &tx).await;
            drop(tx);
            let _ = forwarder.await;
            collected
        }
    }
}

/// Assemble a task's effective input: its description, the user message when
/// `fromUser` is set, any boundary-folded follow-ups, and the named fields
/// pulled from its dependencies' blackboard entries.
fn assemble_prompt(task: &Task, user_message: &str, extra: &[String], board: &Blackboard) -> String {
    let mut sections = vec![task.description.clone()];

    if task.inputs.from_user {
        sections.push(format!("User request:\n{user_message}"));
    }
    for follow_up in extra {
        sections.push(format!("Follow-up from user:\n{follow_up}"));
    }

    for field in &task.inputs.fields {
        let resolved = task
            .inputs
            .from_task
            .iter()
            .find_map(|dep| board.get(&format!("{dep}.{field}")).map(|v| (dep, v)));
        match resolved {
            Some((dep, value)) => sections.push(format!("{field} (from {dep}):\n{value}")),
            None => warn!(
                task_id = %task.id,
                field = %field,
                "input field not found on the blackboard"
            ),
        }
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::TaskInputs;

    fn task_with_inputs(inputs: TaskInputs) -> Task {
        Task {
            id: "T2".to_string(),
            title: "Write".to_string(),
            description: "Draft the answer".to_string(),
            agent_id: "writer-1".to_string(),
            status: TaskStatus::Pending,
            order: 2,
            inputs,
            outputs: vec!["draft".to_string()],
            execution_strategy: ExecutionStrategy::Silent,
        }
    }

    #[test]
    fn test_assemble_prompt_pulls_fields_from_deps() {
        let board = Blackboard::new(Uuid::new_v4());
        board.put("T1.summary", "key findings");

        let task = task_with_inputs(TaskInputs {
            from_user: true,
            from_task: vec!["T1".to_string()],
            fields: vec!["summary".to_string()],
        });

        let prompt = assemble_prompt(&task, "please research X", &[], &board);
        assert!(prompt.starts_with("Draft the answer"));
        assert!(prompt.contains("User request:\nplease research X"));
        assert!(prompt.contains("summary (from T1):\nkey findings"));
    }

    #[test]
    fn test_assemble_prompt_first_declaring_dep_wins() {
        let board = Blackboard::new(Uuid::new_v4());
        board.put("A.notes", "from A");
        board.put("B.notes", "from B");

        let task = task_with_inputs(TaskInputs {
            from_user: false,
            from_task: vec!["A".to_string(), "B".to_string()],
            fields: vec!["notes".to_string()],
        });

        let prompt = assemble_prompt(&task, "", &[], &board);
        assert!(prompt.contains("notes (from A):\nfrom A"));
        assert!(!prompt.contains("from B"));
    }

    #[test]
    fn test_assemble_prompt_missing_field_is_tolerated() {
        let board = Blackboard::new(Uuid::new_v4());
        let task = task_with_inputs(TaskInputs {
            from_user: false,
            from_task: vec!["T1".to_string()],
            fields: vec!["summary".to_string()],
        });
        let prompt = assemble_prompt(&task, "", &[], &board);
        assert_eq!(prompt, "Draft the answer");
    }

    #[test]
    fn test_assemble_prompt_folds_follow_ups() {
        let board = Blackboard::new(Uuid::new_v4());
        let task = task_with_inputs(TaskInputs::default());
        let extra = vec!["also cover Y".to_string()];
        let prompt = assemble_prompt(&task, "original", &extra, &board);
        assert!(prompt.contains("Follow-up from user:\nalso cover Y"));
        // fromUser is false, so the original message is not included.
        assert!(!prompt.contains("original"));
    }
}
