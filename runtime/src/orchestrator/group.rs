//! Named, ordered task groups.

use super::TaskRunner;

/// A named, ordered collection of tasks.
#[derive(Debug, Clone)]
pub struct TaskGroup<T> {
    name: String,
    tasks: Vec<T>,
}

impl<T: TaskRunner> TaskGroup<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_task(&mut self, task: T) {
        self.tasks.push(task);
    }

    /// Detach a task by id.
    pub fn remove_task(&mut self, id: &str) -> Option<T> {
        let index = self.tasks.iter().position(|t| t.id() == id)?;
        Some(self.tasks.remove(index))
    }

    /// Detach the most recently added task.
    pub(crate) fn pop_task(&mut self) -> Option<T> {
        self.tasks.pop()
    }

    pub fn tasks(&self) -> &[T] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T: TaskRunner> Extend<T> for TaskGroup<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}
