use crate::{builtin, BuildSuite, Suite, SuiteContext};
use anyhow::Context as _;
use std::collections::HashMap;

type Factory = fn(SuiteContext) -> anyhow::Result<Box<dyn Suite>>;

fn make<T: BuildSuite>(ctx: SuiteContext) -> anyhow::Result<Box<dyn Suite>> {
    Ok(Box::new(T::build(ctx)?))
}

/// Table of suites compiled into the grader, keyed by class name.
#[derive(Clone)]
pub struct Catalog {
    factories: HashMap<&'static str, Factory>,
}

impl Catalog {
    pub fn empty() -> Catalog {
        Catalog {
            factories: HashMap::new(),
        }
    }

    /// Catalog with all built-in suites.
    pub fn builtin() -> Catalog {
        let mut catalog = Catalog::empty();
        catalog.register::<builtin::CommandSuite>();
        catalog.register::<builtin::RequiredFilesSuite>();
        catalog.register::<builtin::StubSuite>();
        catalog.register::<builtin::DelaySuite>();
        catalog
    }

    pub fn register<T: BuildSuite>(&mut self) {
        let prev = self.factories.insert(T::CLASS, make::<T> as Factory);
        if prev.is_some() {
            tracing::warn!(class = T::CLASS, "suite class registered twice");
        }
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Sorted list of known classes
    pub fn classes(&self) -> Vec<&'static str> {
        let mut classes: Vec<_> = self.factories.keys().copied().collect();
        classes.sort_unstable();
        classes
    }

    pub fn instantiate(&self, class: &str, ctx: SuiteContext) -> anyhow::Result<Box<dyn Suite>> {
        let factory = self
            .factories
            .get(class)
            .with_context(|| format!("unknown suite class {}", class))?;
        factory(ctx).with_context(|| format!("failed to construct suite {}", class))
    }
}
