use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use troupe_agent::{ResponseCollector, StreamingResponder};
use troupe_blackboard::{Blackboard, BoardMessage};
use troupe_core::{AgentRole, RunContext, SupervisorPlan, TroupeError, TroupeResult};
use troupe_orchestrator::{MessageInbox, Orchestrator, RoleDispatcher, RunEvent, RunIo, RunReport};

/// Everything a run leaves behind: the aggregated report plus the
/// blackboard's message log. The board itself is dropped with the run.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Per-task statuses and the overall run status.
    pub report: RunReport,
    /// The run's complete audit log, in sequence order.
    pub log: Vec<BoardMessage>,
}

/// Drives one user request end to end: supervisor plan → task graph →
/// scheduled execution.
///
/// The session owns no cross-run state beyond the worker table; every run
/// gets a fresh blackboard scoped to it. Fatal plan or graph errors are
/// returned as `Err` before any task runs; task-level failures only ever
/// appear inside the report.
pub struct SupervisorSession {
    supervisor: Arc<dyn StreamingResponder>,
    dispatcher: Arc<RoleDispatcher>,
    collector: ResponseCollector,
    inbox: Arc<MessageInbox>,
    sink: Option<mpsc::UnboundedSender<BoardMessage>>,
}

impl SupervisorSession {
    /// Session over a supervisor capability and a worker table.
    pub fn new(supervisor: Arc<dyn StreamingResponder>, dispatcher: Arc<RoleDispatcher>) -> Self {
        Self {
            supervisor,
            dispatcher,
            collector: ResponseCollector::default(),
            inbox: Arc::new(MessageInbox::new()),
            sink: None,
        }
    }

    /// Replace the response collector (custom deadline) for both plan
    /// acquisition and task execution.
    pub fn with_collector(mut self, collector: ResponseCollector) -> Self {
        self.collector = collector;
        self
    }

    /// Mirror every blackboard message into a durable audit sink.
    pub fn with_audit_sink(mut self, sink: mpsc::UnboundedSender<BoardMessage>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The inbox for user messages arriving while a run executes.
    pub fn inbox(&self) -> Arc<MessageInbox> {
        self.inbox.clone()
    }

    /// Queue a user message against the running plan.
    pub fn push_user_message(&self, message: impl Into<String>) {
        self.inbox.push(message);
    }

    /// Execute one user request.
    pub async fn run(
        &self,
        ctx: &RunContext,
        user_message: &str,
        events: mpsc::UnboundedSender<RunEvent>,
        cancel: CancellationToken,
    ) -> TroupeResult<SessionOutcome> {
        let board = {
            let board = Blackboard::new(ctx.run_id);
            Arc::new(match &self.sink {
                Some(sink) => board.with_sink(sink.clone()),
                None => board,
            })
        };

        info!(run_id = %ctx.run_id, "acquiring supervisor plan");
        let plan = self.acquire_plan(user_message, &board).await?;
        plan.validate()?;

        let orchestrator =
            Orchestrator::new(self.dispatcher.clone()).with_collector(self.collector);
        let report = orchestrator
            .run(
                ctx,
                plan,
                user_message,
                RunIo {
                    board: board.clone(),
                    inbox: self.inbox.clone(),
                    events,
                    cancel,
                },
            )
            .await?;

        Ok(SessionOutcome {
            report,
            log: board.messages(),
        })
    }

    /// Collect the supervisor's stream and parse the plan out of it.
    ///
    /// Any failure to obtain or parse the plan is fatal to the run and maps
    /// onto [`TroupeError::PlanParse`].
    async fn acquire_plan(
        &self,
        user_message: &str,
        board: &Blackboard,
    ) -> TroupeResult<SupervisorPlan> {
        let mut handle = self
            .supervisor
            .respond(user_message)
            .await
            .map_err(|e| TroupeError::PlanParse(format!("supervisor unavailable: {e}")))?;

        let collected = self
            .collector
            .collect(&mut handle)
            .await
            .map_err(|e| TroupeError::PlanParse(format!("supervisor stream failed: {e}")))?;
        if collected.is_partial() {
            warn!("supervisor response timed out; parsing partial plan text");
        }
        let text = collected.into_text();

        board.append_message(None, AgentRole::Supervisor, "plan", &text, HashMap::new());
        SupervisorPlan::parse(&text)
    }
}
