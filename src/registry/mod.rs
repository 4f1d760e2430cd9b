//! Suite registration
//!
//! Suites are plain Rust types implementing [`Suite`]. Registering one
//! builds a type-erased [`SuiteEntry`] holding the suite name, its execution
//! mode, and a callable for every test method. A [`Registry`] is filled
//! once at startup and then shared read-only (behind an `Arc`) with the
//! scheduler and the executors, so it cannot change during a run.

mod context;
mod filter;

pub use context::{TestContext, TestOutcome};
pub use filter::{MethodFilter, Pattern};

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::models::SourceLocation;

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Suite name {0} is already registered by another type")]
    DuplicateName(String),
}

/// How the methods of a suite may be scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run inline on the scheduling thread, before any parallel suite
    #[default]
    Serial,
    /// Hand each method to the active executor
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Serial => write!(f, "serial"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Signature of a test method on suite `S`
pub type TestBody<S> = fn(&mut S, &mut TestContext) -> TestOutcome;

/// A named test method of suite `S`
pub struct TestMethod<S> {
    name: String,
    body: TestBody<S>,
    location: SourceLocation,
}

impl<S> TestMethod<S> {
    /// Declare a test method; the call site becomes its source location
    #[track_caller]
    pub fn new(name: impl Into<String>, body: TestBody<S>) -> Self {
        Self {
            name: name.into(),
            body,
            location: SourceLocation::caller(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A group of test methods sharing setup, teardown and an execution mode.
///
/// Every method runs against its own instance built with `Default`.
pub trait Suite: Default + 'static {
    /// Name used in reports and on the wire. Defaults to the type name.
    fn name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn execution_mode() -> ExecutionMode {
        ExecutionMode::Serial
    }

    fn methods() -> Vec<TestMethod<Self>>;

    fn setup(&mut self, _ctx: &mut TestContext) -> TestOutcome {
        Ok(())
    }

    fn teardown(&mut self, _ctx: &mut TestContext) -> TestOutcome {
        Ok(())
    }
}

type Invoker = Arc<dyn Fn(&mut TestContext) + Send + Sync>;

struct MethodEntry {
    name: String,
    location: SourceLocation,
    invoke: Invoker,
}

/// Type-erased registration of one suite
pub struct SuiteEntry {
    type_id: TypeId,
    name: String,
    mode: ExecutionMode,
    methods: Vec<MethodEntry>,
}

impl SuiteEntry {
    fn of<S: Suite>() -> Self {
        let methods = S::methods()
            .into_iter()
            .map(|method| {
                let body = method.body;
                let invoke: Invoker = Arc::new(move |ctx: &mut TestContext| {
                    let mut instance: Option<S> = None;
                    ctx.capture(|ctx| {
                        let suite = instance.insert(S::default());
                        suite.setup(ctx)?;
                        body(suite, ctx)
                    });
                    if let Some(suite) = instance.as_mut() {
                        ctx.capture(|ctx| suite.teardown(ctx));
                    }
                });
                MethodEntry {
                    name: method.name,
                    location: method.location,
                    invoke,
                }
            })
            .collect();

        Self {
            type_id: TypeId::of::<S>(),
            name: S::name().to_string(),
            mode: S::execution_mode(),
            methods,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Method names in declaration order
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    pub fn location_of(&self, method: &str) -> Option<&SourceLocation> {
        self.methods
            .iter()
            .find(|m| m.name == method)
            .map(|m| &m.location)
    }

    /// Run `method` on a fresh instance. Returns false if no such method.
    pub(crate) fn invoke(&self, method: &str, ctx: &mut TestContext) -> bool {
        match self.methods.iter().find(|m| m.name == method) {
            Some(entry) => {
                (entry.invoke)(ctx);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for SuiteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteEntry")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .finish()
    }
}

/// The set of registered suites
#[derive(Debug, Default)]
pub struct Registry {
    suites: Vec<Arc<SuiteEntry>>,
    seen: HashSet<TypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register suite `S`. Returns false if it was already registered.
    pub fn register<S: Suite>(&mut self) -> Result<bool, RegistryError> {
        let type_id = TypeId::of::<S>();
        if self.seen.contains(&type_id) {
            return Ok(false);
        }

        let entry = SuiteEntry::of::<S>();
        if self.suites.iter().any(|s| s.name == entry.name) {
            return Err(RegistryError::DuplicateName(entry.name));
        }

        debug!(
            "Registered suite {} ({}, {} methods)",
            entry.name,
            entry.mode,
            entry.methods.len()
        );
        self.seen.insert(type_id);
        self.suites.push(Arc::new(entry));
        Ok(true)
    }

    /// Builder form of [`Registry::register`]
    pub fn with<S: Suite>(mut self) -> Result<Self, RegistryError> {
        self.register::<S>()?;
        Ok(self)
    }

    /// All registered suites, in registration order
    pub fn suites(&self) -> &[Arc<SuiteEntry>] {
        &self.suites
    }

    pub fn suite(&self, name: &str) -> Option<&Arc<SuiteEntry>> {
        self.suites.iter().find(|s| s.name == name)
    }

    pub fn contains<S: Suite>(&self) -> bool {
        self.suites.iter().any(|s| s.type_id == TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Forget every registered suite
    pub fn reset(&mut self) {
        self.suites.clear();
        self.seen.clear();
    }

    /// Digest of every `Suite#method` name, independent of registration
    /// order. Two processes can only share work if their digests agree.
    pub fn catalogue_digest(&self) -> u64 {
        let mut names: Vec<String> = self
            .suites
            .iter()
            .flat_map(|s| s.method_names().map(move |m| format!("{}#{}", s.name, m)))
            .collect();
        names.sort();

        let mut hasher = DefaultHasher::new();
        names.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Suites shared by tests across the crate

    use super::*;

    #[derive(Default)]
    pub struct Foo;

    impl Suite for Foo {
        fn methods() -> Vec<TestMethod<Self>> {
            vec![
                TestMethod::new("test_a", |_, ctx| Ok(ctx.assert(true, "a")?)),
                TestMethod::new("test_b", |_, ctx| Ok(ctx.assert(true, "b")?)),
            ]
        }
    }

    #[derive(Default)]
    pub struct Mixed;

    impl Suite for Mixed {
        fn execution_mode() -> ExecutionMode {
            ExecutionMode::Parallel
        }

        fn methods() -> Vec<TestMethod<Self>> {
            vec![
                TestMethod::new("test_pass", |_, ctx| {
                    ctx.assert_eq(4, 2 + 2)?;
                    Ok(())
                }),
                TestMethod::new("test_fail", |_, ctx| Ok(ctx.flunk("wrong answer")?)),
                TestMethod::new("test_skip", |_, ctx| Ok(ctx.skip("not today")?)),
                TestMethod::new("test_error", |_, _| {
                    Err(anyhow::anyhow!("database unavailable"))
                }),
            ]
        }
    }

    #[derive(Default)]
    pub struct Empty;

    impl Suite for Empty {
        fn methods() -> Vec<TestMethod<Self>> {
            Vec::new()
        }
    }

    /// Parallel suite whose methods just count assertions
    macro_rules! parallel_suite {
        ($name:ident, $count:expr) => {
            #[derive(Default)]
            pub struct $name;

            impl Suite for $name {
                fn execution_mode() -> ExecutionMode {
                    ExecutionMode::Parallel
                }

                fn methods() -> Vec<TestMethod<Self>> {
                    (0..$count)
                        .map(|i| {
                            TestMethod::new(format!("test_{i}"), |_, ctx| {
                                ctx.pass();
                                Ok(())
                            })
                        })
                        .collect()
                }
            }
        };
    }

    parallel_suite!(Wide, 40);
    parallel_suite!(Narrow, 3);
}
