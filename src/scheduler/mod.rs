//! Run scheduling
//!
//! Builds a run plan from the registry (filter, shuffle, partition) and
//! drives it: serial suites run on the calling thread first, then every
//! method of every parallel suite is handed to the executor. Executors that
//! drain a remote queue still run the serial suites locally.

mod signals;

pub use signals::{RunSignals, SignalConfig, StatusSignal};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::executor::{run_and_record, Executor, ExecutorError, WorkItem};
use crate::models::BacktraceFilter;
use crate::registry::{ExecutionMode, MethodFilter, Registry};
use crate::output::OutputSink;
use crate::reporter::SharedReporter;

/// One suite with the methods selected to run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedSuite {
    pub name: String,
    pub methods: Vec<String>,
}

impl PlannedSuite {
    fn work_items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        self.methods.iter().map(|m| WorkItem::new(&self.name, m))
    }
}

/// Ordered run plan: serial suites, then parallel suites
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub seed: u64,
    pub serial: Vec<PlannedSuite>,
    pub parallel: Vec<PlannedSuite>,
}

impl RunPlan {
    /// Total number of methods to run
    pub fn len(&self) -> usize {
        self.serial
            .iter()
            .chain(&self.parallel)
            .map(|s| s.methods.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives a whole run against one executor
pub struct Scheduler {
    registry: Arc<Registry>,
    filter: BacktraceFilter,
    signals: SignalConfig,
    diagnostics: OutputSink,
    interrupted: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, filter: BacktraceFilter) -> Self {
        Self {
            registry,
            filter,
            signals: SignalConfig::default(),
            diagnostics: OutputSink::stderr(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Watch for status and interrupt signals during runs
    pub fn with_signals(mut self, signals: SignalConfig) -> Self {
        self.signals = signals;
        self
    }

    /// Where status dumps and the interrupt notice go
    pub fn with_diagnostics(mut self, diagnostics: OutputSink) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Flag that stops dispatch once set. Executors that block on remote
    /// peers should watch it too.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Select, shuffle and partition the registered suites.
    ///
    /// Suites are shuffled as whole units; methods keep their declaration
    /// order. Suites with nothing selected are dropped.
    pub fn plan(&self, filter: &MethodFilter, seed: u64) -> RunPlan {
        let mut suites: Vec<(ExecutionMode, PlannedSuite)> = self
            .registry
            .suites()
            .iter()
            .filter_map(|suite| {
                let methods = filter.select(suite);
                if methods.is_empty() {
                    return None;
                }
                let planned = PlannedSuite {
                    name: suite.name().to_string(),
                    methods,
                };
                Some((suite.mode(), planned))
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        suites.shuffle(&mut rng);

        let mut plan = RunPlan {
            seed,
            ..RunPlan::default()
        };
        for (mode, suite) in suites {
            match mode {
                ExecutionMode::Serial => plan.serial.push(suite),
                ExecutionMode::Parallel => plan.parallel.push(suite),
            }
        }

        info!(
            "Planned {} test(s) with seed {}: {} serial suite(s), {} parallel suite(s)",
            plan.len(),
            seed,
            plan.serial.len(),
            plan.parallel.len()
        );
        plan
    }

    /// Run the plan and return the verdict.
    ///
    /// An interrupt stops dispatch but the run still shuts the executor down
    /// and reports whatever completed.
    pub fn run(
        &self,
        plan: &RunPlan,
        executor: &mut dyn Executor,
        reporter: SharedReporter,
    ) -> Result<bool, ExecutorError> {
        executor.start(Arc::clone(&reporter))?;
        reporter.start();

        let guard = self.install_signals(&reporter);

        let dispatched = self.dispatch(plan, executor, &reporter);
        if let Err(e) = &dispatched {
            error!("Dispatch failed: {}", e);
        }

        let drained = executor.shutdown();
        drop(guard);
        reporter.report();

        dispatched?;
        drained?;
        Ok(reporter.passed())
    }

    fn install_signals(&self, reporter: &SharedReporter) -> Option<RunSignals> {
        if self.signals.status_signal.is_none() && !self.signals.catch_interrupt {
            return None;
        }
        RunSignals::install(
            &self.signals,
            Arc::clone(reporter),
            self.diagnostics.clone(),
            Arc::clone(&self.interrupted),
        )
        .map_err(|e| warn!("Could not start signal watcher: {}", e))
        .ok()
    }

    fn dispatch(
        &self,
        plan: &RunPlan,
        executor: &mut dyn Executor,
        reporter: &SharedReporter,
    ) -> Result<(), ExecutorError> {
        for item in plan.serial.iter().flat_map(PlannedSuite::work_items) {
            if self.check_interrupt() {
                return Ok(());
            }
            run_and_record(&self.registry, &item, &self.filter, reporter.as_ref());
        }

        if !executor.owns_queue() {
            debug!("Executor drains a remote queue, parallel suites are not submitted");
            return Ok(());
        }
        for item in plan.parallel.iter().flat_map(PlannedSuite::work_items) {
            if self.check_interrupt() {
                return Ok(());
            }
            executor.submit(item)?;
        }
        Ok(())
    }

    fn check_interrupt(&self) -> bool {
        if !self.interrupted.load(Ordering::SeqCst) {
            return false;
        }
        warn!("Interrupted. Exiting...");
        self.diagnostics.write_line("Interrupted. Exiting...");
        self.diagnostics.flush();
        true
    }
}
