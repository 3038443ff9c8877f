//! Cooperative task scheduler for deferred and periodic work.
//!
//! The scheduler allows deferring task execution to a specific time or running
//! tasks periodically at fixed intervals. It is owned by the component that
//! schedules the work (a view owns its own scheduler instance) and is driven
//! cooperatively: the owner calls [`TaskScheduler::process_ready`] from its
//! event-processing path, typically after asking [`TaskScheduler::time_until_next`]
//! how long it may sleep.
//!
//! # Example
//!
//! ```
//! use alder_core::TaskScheduler;
//! use std::time::Duration;
//!
//! let mut scheduler = TaskScheduler::new();
//!
//! // Schedule a one-shot task
//! scheduler.schedule_once(Duration::from_millis(5), || {
//!     println!("Task executed!");
//! });
//!
//! // Schedule a repeating task
//! let tick = scheduler.schedule_repeating(Duration::from_millis(50), || {
//!     println!("Periodic task executed!");
//! });
//!
//! // ... later, from the owner's event loop:
//! scheduler.process_ready();
//!
//! // Cancel the repeating task when no longer needed
//! scheduler.cancel(tick).unwrap();
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, SchedulerError};

new_key_type! {
    /// A unique identifier for a scheduled task.
    pub struct ScheduledTaskId;
}

/// The type of scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledTaskKind {
    /// Executes once at the scheduled time.
    OneShot,
    /// Executes repeatedly at the specified interval.
    Repeating,
}

/// A boxed task closure.
type BoxedScheduledTask = Box<dyn FnMut() + 'static>;

/// Internal scheduled task data.
struct ScheduledTaskData {
    /// When this task should next execute.
    next_run: Instant,
    /// The interval for repeating tasks.
    interval: Duration,
    /// The kind of task.
    kind: ScheduledTaskKind,
    /// Whether this task is active.
    active: bool,
    /// The task closure to execute.
    task: BoxedScheduledTask,
}

/// An entry in the scheduler queue (min-heap by execution time).
#[derive(Debug, Clone, Copy)]
struct SchedulerQueueEntry {
    id: ScheduledTaskId,
    run_time: Instant,
}

impl PartialEq for SchedulerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_time == other.run_time
    }
}

impl Eq for SchedulerQueueEntry {}

impl PartialOrd for SchedulerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchedulerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.run_time.cmp(&self.run_time)
    }
}

/// Manages scheduled tasks for a single owner.
///
/// The scheduler maintains a priority queue of tasks ordered by their next
/// execution time. Tasks can be one-shot (execute once) or repeating
/// (execute at regular intervals).
pub struct TaskScheduler {
    /// All registered scheduled tasks.
    tasks: SlotMap<ScheduledTaskId, ScheduledTaskData>,
    /// Priority queue of pending task executions (min-heap by run time).
    queue: BinaryHeap<SchedulerQueueEntry>,
}

impl TaskScheduler {
    /// Create a new task scheduler.
    pub fn new() -> Self {
        Self {
            tasks: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Schedule a one-shot task to execute after the specified delay.
    ///
    /// Returns the task ID that can be used to cancel or reschedule the task.
    pub fn schedule_once<F>(&mut self, delay: Duration, task: F) -> ScheduledTaskId
    where
        F: FnMut() + 'static,
    {
        let now = Instant::now();
        let next_run = now + delay;

        let data = ScheduledTaskData {
            next_run,
            interval: delay,
            kind: ScheduledTaskKind::OneShot,
            active: true,
            task: Box::new(task),
        };

        let id = self.tasks.insert(data);
        self.queue.push(SchedulerQueueEntry {
            id,
            run_time: next_run,
        });

        id
    }

    /// Schedule a repeating task that executes at the specified interval.
    ///
    /// The first execution occurs after `interval` duration.
    /// Returns the task ID that can be used to cancel the task.
    pub fn schedule_repeating<F>(&mut self, interval: Duration, task: F) -> ScheduledTaskId
    where
        F: FnMut() + 'static,
    {
        let now = Instant::now();
        let next_run = now + interval;

        let data = ScheduledTaskData {
            next_run,
            interval,
            kind: ScheduledTaskKind::Repeating,
            active: true,
            task: Box::new(task),
        };

        let id = self.tasks.insert(data);
        self.queue.push(SchedulerQueueEntry {
            id,
            run_time: next_run,
        });

        id
    }

    /// Cancel and remove a scheduled task.
    ///
    /// Returns `Ok(())` if the task was found and cancelled, or an error if not found.
    pub fn cancel(&mut self, id: ScheduledTaskId) -> Result<()> {
        if let Some(task) = self.tasks.get_mut(id) {
            task.active = false;
            self.tasks.remove(id);
            Ok(())
        } else {
            Err(SchedulerError::InvalidTaskId.into())
        }
    }

    /// Reschedule an existing task with a new delay.
    ///
    /// For one-shot tasks, this sets a new execution time.
    /// For repeating tasks, this resets the schedule with the current time as base.
    ///
    /// Returns `Ok(())` if successful, or an error if the task was not found.
    pub fn reschedule(&mut self, id: ScheduledTaskId, delay: Duration) -> Result<()> {
        if let Some(task) = self.tasks.get_mut(id) {
            let now = Instant::now();
            task.next_run = now + delay;

            // Add new queue entry (old one will be skipped when processed)
            self.queue.push(SchedulerQueueEntry {
                id,
                run_time: task.next_run,
            });

            Ok(())
        } else {
            Err(SchedulerError::InvalidTaskId.into())
        }
    }

    /// Run a pending task immediately, ahead of its deadline.
    ///
    /// One-shot tasks are consumed; repeating tasks restart their interval
    /// from now. Returns an error if the task is not active.
    pub fn fire_now(&mut self, id: ScheduledTaskId) -> Result<()> {
        let Some(task) = self.tasks.get_mut(id) else {
            return Err(SchedulerError::InvalidTaskId.into());
        };
        (task.task)();
        match task.kind {
            ScheduledTaskKind::OneShot => {
                task.active = false;
                self.tasks.remove(id);
            }
            ScheduledTaskKind::Repeating => {
                let next_run = Instant::now() + task.interval;
                task.next_run = next_run;
                self.queue.push(SchedulerQueueEntry { id, run_time: next_run });
            }
        }
        Ok(())
    }

    /// Check if a scheduled task is currently active.
    pub fn is_active(&self, id: ScheduledTaskId) -> bool {
        self.tasks.get(id).is_some_and(|t| t.active)
    }

    /// Get the duration until the next task should execute, if any.
    ///
    /// Returns `None` if there are no active scheduled tasks.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        // Clean up any inactive tasks from the front of the queue.
        while let Some(entry) = self.queue.peek() {
            if !self.tasks.get(entry.id).is_some_and(|t| t.active) {
                self.queue.pop();
            } else {
                break;
            }
        }

        self.queue.peek().map(|entry| {
            let now = Instant::now();
            if entry.run_time > now {
                entry.run_time - now
            } else {
                Duration::ZERO
            }
        })
    }

    /// Process all tasks that should execute now.
    ///
    /// Returns the number of tasks that were executed.
    #[tracing::instrument(skip(self), target = "alder_core::scheduler", level = "trace")]
    pub fn process_ready(&mut self) -> usize {
        let now = Instant::now();
        let mut executed_count = 0;

        while let Some(entry) = self.queue.peek() {
            // Check if this task should run.
            if entry.run_time > now {
                break;
            }

            let Some(entry) = self.queue.pop() else {
                break;
            };
            let id = entry.id;

            // Check if task is still active.
            let Some(task_data) = self.tasks.get_mut(id) else {
                continue;
            };

            if !task_data.active {
                continue;
            }

            // Check if this queue entry is stale (task was rescheduled).
            // If the entry's run_time doesn't match the task's current next_run,
            // this is an old entry and should be skipped.
            if entry.run_time != task_data.next_run {
                continue;
            }

            // Execute the task.
            tracing::trace!(target: "alder_core::scheduler", ?id, "executing scheduled task");
            (task_data.task)();
            executed_count += 1;

            match task_data.kind {
                ScheduledTaskKind::OneShot => {
                    // One-shot tasks are removed after execution.
                    task_data.active = false;
                    self.tasks.remove(id);
                }
                ScheduledTaskKind::Repeating => {
                    // Schedule the next execution.
                    // Use the scheduled time as base to avoid drift.
                    let next_run = entry.run_time + task_data.interval;
                    task_data.next_run = next_run;
                    self.queue.push(SchedulerQueueEntry {
                        id,
                        run_time: next_run,
                    });
                }
            }
        }

        executed_count
    }

    /// Get the number of active scheduled tasks.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|(_, t)| t.active).count()
    }

    /// Check if there are any tasks ready to execute now.
    pub fn has_ready(&mut self) -> bool {
        // Clean up inactive entries first
        while let Some(entry) = self.queue.peek() {
            if !self.tasks.get(entry.id).is_some_and(|t| t.active) {
                self.queue.pop();
            } else {
                break;
            }
        }

        self.queue
            .peek()
            .is_some_and(|entry| entry.run_time <= Instant::now())
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_schedule_once() {
        let mut scheduler = TaskScheduler::new();
        let executed = Rc::new(Cell::new(0));
        let executed_clone = executed.clone();

        let id = scheduler.schedule_once(Duration::from_millis(10), move || {
            executed_clone.set(executed_clone.get() + 1);
        });

        assert!(scheduler.is_active(id));
        assert_eq!(scheduler.active_count(), 1);

        // Task shouldn't execute immediately
        assert_eq!(scheduler.process_ready(), 0);
        assert_eq!(executed.get(), 0);

        // Wait for the task to be ready
        std::thread::sleep(Duration::from_millis(15));

        // Now it should execute
        assert_eq!(scheduler.process_ready(), 1);
        assert_eq!(executed.get(), 1);

        // Task should be removed after execution
        assert!(!scheduler.is_active(id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_schedule_repeating() {
        let mut scheduler = TaskScheduler::new();
        let executed = Rc::new(Cell::new(0));
        let executed_clone = executed.clone();

        // Use longer intervals to avoid timing issues in CI
        let id = scheduler.schedule_repeating(Duration::from_millis(100), move || {
            executed_clone.set(executed_clone.get() + 1);
        });

        assert!(scheduler.is_active(id));

        // Wait and process - verify at least one execution
        std::thread::sleep(Duration::from_millis(150));
        scheduler.process_ready();
        let count1 = executed.get();
        assert!(count1 >= 1, "Expected at least 1 execution, got {}", count1);

        // Wait more and verify executions increased (repeating works)
        std::thread::sleep(Duration::from_millis(150));
        scheduler.process_ready();
        let count2 = executed.get();
        assert!(
            count2 > count1,
            "Expected executions to increase from {} but got {}",
            count1,
            count2
        );

        // Task should still be active (it's repeating)
        assert!(scheduler.is_active(id));

        // Cancel it
        scheduler.cancel(id).unwrap();
        assert!(!scheduler.is_active(id));
    }

    #[test]
    fn test_cancel_task() {
        let mut scheduler = TaskScheduler::new();
        let executed = Rc::new(Cell::new(0));
        let executed_clone = executed.clone();

        let id = scheduler.schedule_once(Duration::from_millis(10), move || {
            executed_clone.set(executed_clone.get() + 1);
        });

        assert!(scheduler.is_active(id));

        // Cancel before execution
        scheduler.cancel(id).unwrap();
        assert!(!scheduler.is_active(id));

        // Wait and try to process
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(scheduler.process_ready(), 0);
        assert_eq!(executed.get(), 0);

        // Cancelling again should fail
        assert!(scheduler.cancel(id).is_err());
    }

    #[test]
    fn test_fire_now() {
        let mut scheduler = TaskScheduler::new();
        let executed = Rc::new(Cell::new(0));
        let executed_clone = executed.clone();

        // Scheduled far in the future; fire_now runs it anyway.
        let id = scheduler.schedule_once(Duration::from_secs(60), move || {
            executed_clone.set(executed_clone.get() + 1);
        });

        scheduler.fire_now(id).unwrap();
        assert_eq!(executed.get(), 1);
        assert!(!scheduler.is_active(id));

        // Firing a consumed task fails.
        assert!(scheduler.fire_now(id).is_err());
    }

    #[test]
    fn test_time_until_next() {
        let mut scheduler = TaskScheduler::new();

        // No tasks
        assert!(scheduler.time_until_next().is_none());

        // Schedule a task
        let _id = scheduler.schedule_once(Duration::from_millis(100), || {});

        let time_until = scheduler.time_until_next();
        assert!(time_until.is_some());
        assert!(time_until.unwrap() <= Duration::from_millis(100));
        assert!(time_until.unwrap() > Duration::from_millis(90));
    }

    #[test]
    fn test_multiple_tasks_order() {
        let mut scheduler = TaskScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let order1 = order.clone();
        scheduler.schedule_once(Duration::from_millis(30), move || {
            order1.borrow_mut().push(3);
        });

        let order2 = order.clone();
        scheduler.schedule_once(Duration::from_millis(10), move || {
            order2.borrow_mut().push(1);
        });

        let order3 = order.clone();
        scheduler.schedule_once(Duration::from_millis(20), move || {
            order3.borrow_mut().push(2);
        });

        // Wait for all to be ready
        std::thread::sleep(Duration::from_millis(35));
        scheduler.process_ready();

        // Tasks should execute in order of their scheduled times
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_reschedule_pushes_deadline_back() {
        let mut scheduler = TaskScheduler::new();
        let executed = Rc::new(Cell::new(0));
        let executed_clone = executed.clone();

        let id = scheduler.schedule_once(Duration::from_millis(10), move || {
            executed_clone.set(executed_clone.get() + 1);
        });

        // Push the deadline well into the future before it can run.
        scheduler.reschedule(id, Duration::from_secs(60)).unwrap();

        std::thread::sleep(Duration::from_millis(15));
        // The stale queue entry for the original deadline must be skipped.
        assert_eq!(scheduler.process_ready(), 0);
        assert_eq!(executed.get(), 0);
        assert!(scheduler.is_active(id));
    }
}
