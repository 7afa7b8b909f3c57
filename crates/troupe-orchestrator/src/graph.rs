use std::collections::HashMap;
use troupe_core::{SupervisorPlan, Task, TroupeError, TroupeResult};

/// Dependency structure over a plan's task list.
///
/// An edge A → B exists when B's `fromTask` includes A's id. The graph keeps
/// the plan's insertion order, which breaks `order` ties in every mode.
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Build the graph from a plan's task list.
    pub fn from_plan(plan: &SupervisorPlan) -> Self {
        Self::new(plan.tasks.clone())
    }

    /// Build the graph from an owned task list.
    pub fn new(tasks: Vec<Task>) -> Self {
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self { tasks, index }
    }

    /// Validate the dependency structure.
    ///
    /// Fails with [`TroupeError::UnknownReference`] when a `fromTask` id does
    /// not resolve, and [`TroupeError::CyclicDependency`] when the edges form
    /// a cycle. Runs independently of plan-level validation.
    pub fn validate(&self) -> TroupeResult<()> {
        for task in &self.tasks {
            for dep in &task.inputs.from_task {
                if !self.index.contains_key(dep) {
                    return Err(TroupeError::UnknownReference {
                        task: task.id.clone(),
                        reference: dep.clone(),
                    });
                }
            }
        }

        // Three-color DFS: 1 = in progress, 2 = done.
        let mut visited: HashMap<&str, u8> = HashMap::new();
        for task in &self.tasks {
            self.dfs_cycle(&task.id, &mut visited)?;
        }
        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashMap<&'a str, u8>,
    ) -> TroupeResult<()> {
        match visited.get(id) {
            Some(1) => return Err(TroupeError::CyclicDependency(id.to_string())),
            Some(2) => return Ok(()),
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(&i) = self.index.get(id) {
            for dep in &self.tasks[i].inputs.from_task {
                self.dfs_cycle(dep, visited)?;
            }
        }
        visited.insert(id, 2);
        Ok(())
    }

    /// SERIAL ordering: `order` ascending, ties broken by list position.
    pub fn serial_sequence(&self) -> Vec<&Task> {
        let mut sequence: Vec<(usize, &Task)> = self.tasks.iter().enumerate().collect();
        sequence.sort_by_key(|(position, task)| (task.order, *position));
        sequence.into_iter().map(|(_, task)| task).collect()
    }

    /// PARALLEL ordering: one batch containing every task. Declared
    /// dependencies are still enforced at dispatch time.
    pub fn parallel_batch(&self) -> Vec<&Task> {
        self.tasks.iter().collect()
    }

    /// HYBRID ordering: tasks sharing an `order` value form one group;
    /// groups ascend by `order`. Members run concurrently, groups
    /// sequentially.
    pub fn hybrid_groups(&self) -> Vec<Vec<&Task>> {
        let mut groups: Vec<(i32, Vec<&Task>)> = Vec::new();
        for task in self.serial_sequence() {
            match groups.last_mut() {
                Some((order, group)) if *order == task.order => group.push(task),
                _ => groups.push((task.order, vec![task])),
            }
        }
        groups.into_iter().map(|(_, group)| group).collect()
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// All tasks in plan order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
