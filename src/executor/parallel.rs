//! Parallel test execution
//!
//! A fixed pool of worker threads draining one shared FIFO queue. Shutdown
//! pushes one poison pill per worker and joins them all, so every item
//! submitted before `shutdown` has been run and recorded when it returns.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use super::{run_and_record, Executor, ExecutorError, WorkItem};
use crate::models::BacktraceFilter;
use crate::registry::Registry;
use crate::reporter::SharedReporter;

enum Job {
    Run(WorkItem),
    Stop,
}

/// Worker-thread pool executor
pub struct LocalParallelExecutor {
    size: usize,
    registry: Arc<Registry>,
    filter: BacktraceFilter,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl LocalParallelExecutor {
    pub fn new(size: usize, registry: Arc<Registry>, filter: BacktraceFilter) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            size: size.max(1),
            registry,
            filter,
            sender,
            receiver,
            workers: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn spawn_worker(&self, id: usize, reporter: SharedReporter) -> std::io::Result<JoinHandle<()>> {
        let receiver = self.receiver.clone();
        let registry = Arc::clone(&self.registry);
        let filter = self.filter.clone();

        thread::Builder::new()
            .name(format!("tally-worker-{id}"))
            .spawn(move || {
                let mut executed = 0usize;
                while let Ok(Job::Run(item)) = receiver.recv() {
                    run_and_record(&registry, &item, &filter, reporter.as_ref());
                    executed += 1;
                }
                debug!("Worker {} stopping after {} item(s)", id, executed);
            })
    }
}

impl Executor for LocalParallelExecutor {
    fn start(&mut self, reporter: SharedReporter) -> Result<(), ExecutorError> {
        if !self.workers.is_empty() {
            return Ok(());
        }

        info!("Starting {} worker thread(s)", self.size);
        for id in 0..self.size {
            let handle = self.spawn_worker(id, Arc::clone(&reporter))?;
            self.workers.push(handle);
        }
        Ok(())
    }

    fn submit(&mut self, item: WorkItem) -> Result<(), ExecutorError> {
        if self.workers.is_empty() {
            return Err(ExecutorError::NotStarted);
        }
        self.sender
            .send(Job::Run(item))
            .map_err(|_| ExecutorError::QueueClosed)
    }

    fn shutdown(&mut self) -> Result<(), ExecutorError> {
        for _ in &self.workers {
            self.sender
                .send(Job::Stop)
                .map_err(|_| ExecutorError::QueueClosed)?;
        }

        let panicked = self
            .workers
            .drain(..)
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();

        if panicked > 0 {
            error!("{} worker thread(s) panicked", panicked);
            return Err(ExecutorError::WorkerPanicked(panicked));
        }
        debug!("All workers joined");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::{Mixed, Narrow, Wide};
    use crate::reporter::fixtures::Collector;
    use std::collections::HashSet;

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::new()
                .with::<Wide>()
                .unwrap()
                .with::<Narrow>()
                .unwrap()
                .with::<Mixed>()
                .unwrap(),
        )
    }

    fn all_items(registry: &Registry) -> Vec<WorkItem> {
        registry
            .suites()
            .iter()
            .flat_map(|s| s.method_names().map(|m| WorkItem::new(s.name(), m)))
            .collect()
    }

    #[test]
    fn test_submit_before_start_fails() {
        let mut executor = LocalParallelExecutor::new(2, registry(), BacktraceFilter::default());
        assert!(matches!(
            executor.submit(WorkItem::new("Wide", "test_0")),
            Err(ExecutorError::NotStarted)
        ));
    }

    #[test]
    fn test_zero_workers_clamped_to_one() {
        let executor = LocalParallelExecutor::new(0, registry(), BacktraceFilter::default());
        assert_eq!(executor.size(), 1);
    }

    #[test]
    fn test_every_item_runs_exactly_once() {
        let registry = registry();
        let items = all_items(&registry);
        let collector = Arc::new(Collector::default());

        let mut executor =
            LocalParallelExecutor::new(4, Arc::clone(&registry), BacktraceFilter::default());
        executor.start(collector.clone()).unwrap();
        for item in &items {
            executor.submit(item.clone()).unwrap();
        }
        executor.shutdown().unwrap();

        let recorded = collector.identifiers();
        assert_eq!(recorded.len(), items.len());

        let unique: HashSet<_> = recorded.iter().cloned().collect();
        let expected: HashSet<_> = items.iter().map(|i| i.to_string()).collect();
        assert_eq!(unique, expected);
        assert_eq!(collector.prerecords().len(), items.len());
    }

    #[test]
    fn test_failures_do_not_stop_workers() {
        let registry = registry();
        let collector = Arc::new(Collector::default());

        let mut executor = LocalParallelExecutor::new(2, registry, BacktraceFilter::default());
        executor.start(collector.clone()).unwrap();
        for method in ["test_error", "test_fail", "test_pass", "test_skip"] {
            executor.submit(WorkItem::new("Mixed", method)).unwrap();
        }
        executor.shutdown().unwrap();

        let mut codes: Vec<char> = collector
            .results()
            .iter()
            .map(|r| r.result_code().symbol())
            .collect();
        codes.sort();
        assert_eq!(codes, vec!['.', 'E', 'F', 'S']);
    }

    #[test]
    fn test_shutdown_without_work() {
        let mut executor = LocalParallelExecutor::new(3, registry(), BacktraceFilter::default());
        executor.start(Arc::new(Collector::default())).unwrap();
        executor.shutdown().unwrap();
        executor.shutdown().unwrap();
    }
}
