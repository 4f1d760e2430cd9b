//! Self-check suites shipped with the binary
//!
//! Small suites covering both execution modes, so `tally` can be tried end
//! to end, locally or with `--listen`/`--connect`, without writing any.

use std::collections::{BTreeSet, HashMap};

use crate::registry::{
    ExecutionMode, Registry, RegistryError, Suite, TestContext, TestMethod, TestOutcome,
};

/// Registry holding every demo suite
pub fn registry() -> Result<Registry, RegistryError> {
    Registry::new()
        .with::<Arithmetic>()?
        .with::<Parsing>()?
        .with::<Collections>()?
        .with::<Platform>()
}

#[derive(Default)]
pub struct Arithmetic;

impl Suite for Arithmetic {
    fn methods() -> Vec<TestMethod<Self>> {
        vec![
            TestMethod::new("test_addition", |_, ctx| {
                ctx.assert_eq(5, 2 + 3)?;
                Ok(())
            }),
            TestMethod::new("test_checked_division", |_, ctx| {
                ctx.assert_eq(None, 1u32.checked_div(0))?;
                ctx.assert_eq(Some(4), 8u32.checked_div(2))?;
                Ok(())
            }),
            TestMethod::new("test_wrapping", |_, ctx| {
                ctx.assert_eq(0u8, u8::MAX.wrapping_add(1))?;
                Ok(())
            }),
        ]
    }
}

#[derive(Default)]
pub struct Parsing {
    input: Vec<&'static str>,
}

impl Suite for Parsing {
    fn execution_mode() -> ExecutionMode {
        ExecutionMode::Parallel
    }

    fn setup(&mut self, _ctx: &mut TestContext) -> TestOutcome {
        self.input = vec!["42", "0x2a", "forty-two"];
        Ok(())
    }

    fn methods() -> Vec<TestMethod<Self>> {
        vec![
            TestMethod::new("test_decimal", |suite, ctx| {
                ctx.assert_eq(Ok(42), suite.input[0].parse::<u32>())?;
                Ok(())
            }),
            TestMethod::new("test_hex", |suite, ctx| {
                let digits = suite.input[1].trim_start_matches("0x");
                ctx.assert_eq(Ok(42), u32::from_str_radix(digits, 16))?;
                Ok(())
            }),
            TestMethod::new("test_rejects_words", |suite, ctx| {
                ctx.refute(suite.input[2].parse::<u32>().is_ok(), "words are not numbers")?;
                Ok(())
            }),
        ]
    }
}

#[derive(Default)]
pub struct Collections;

impl Suite for Collections {
    fn execution_mode() -> ExecutionMode {
        ExecutionMode::Parallel
    }

    fn methods() -> Vec<TestMethod<Self>> {
        vec![
            TestMethod::new("test_sort_dedup", |_, ctx| {
                let mut values = vec![3, 1, 3, 2, 1];
                values.sort_unstable();
                values.dedup();
                ctx.assert_eq(vec![1, 2, 3], values)?;
                Ok(())
            }),
            TestMethod::new("test_entry_counts", |_, ctx| {
                let mut counts: HashMap<char, usize> = HashMap::new();
                for c in "tally".chars() {
                    *counts.entry(c).or_default() += 1;
                }
                ctx.assert_eq(Some(&2), counts.get(&'l'))?;
                Ok(())
            }),
            TestMethod::new("test_set_union", |_, ctx| {
                let a: BTreeSet<_> = [1, 2].into();
                let b: BTreeSet<_> = [2, 3].into();
                let union: Vec<_> = a.union(&b).copied().collect();
                ctx.assert_eq(vec![1, 2, 3], union)?;
                Ok(())
            }),
        ]
    }
}

#[derive(Default)]
pub struct Platform;

impl Suite for Platform {
    fn methods() -> Vec<TestMethod<Self>> {
        vec![
            TestMethod::new("test_path_separator", |_, ctx| {
                ctx.assert(
                    std::path::MAIN_SEPARATOR == '/' || std::path::MAIN_SEPARATOR == '\\',
                    "unknown path separator",
                )?;
                Ok(())
            }),
            TestMethod::new("test_windows_drive_paths", |_, ctx| {
                if !cfg!(windows) {
                    ctx.skip("drive letters only exist on Windows")?;
                }
                ctx.assert(
                    std::path::Path::new(r"C:\tally").has_root(),
                    "drive path has no root",
                )?;
                Ok(())
            }),
        ]
    }
}
