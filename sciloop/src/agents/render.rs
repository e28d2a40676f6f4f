//! Code stub rendering for fixes and generated benchmark tests.

use std::fmt;

use anyhow::Result;
use minijinja::{Environment, Value};

const FIX_BEFORE_TEMPLATE: &str = include_str!("templates/fix_before.rs.j2");
const FIX_AFTER_TEMPLATE: &str = include_str!("templates/fix_after.rs.j2");
const BENCHMARK_TEST_TEMPLATE: &str = include_str!("templates/benchmark_test.rs.j2");

/// Template engine wrapper around minijinja.
pub(crate) struct StubEngine {
    env: Environment<'static>,
}

impl StubEngine {
    pub(crate) fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("fix_before", FIX_BEFORE_TEMPLATE)
            .expect("fix_before template should be valid");
        env.add_template("fix_after", FIX_AFTER_TEMPLATE)
            .expect("fix_after template should be valid");
        env.add_template("benchmark_test", BENCHMARK_TEST_TEMPLATE)
            .expect("benchmark_test template should be valid");
        Self { env }
    }

    pub(crate) fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

impl fmt::Debug for StubEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubEngine").finish_non_exhaustive()
    }
}
