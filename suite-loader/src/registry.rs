use crate::Catalog;
use anyhow::Context as _;
use grader_apis::{Implementation, SuiteConfig};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Suite which could not be resolved
#[derive(Debug, Clone)]
pub struct Rejection {
    pub name: String,
    pub reason: String,
}

/// Maps suite names to runnable implementations.
///
/// Nothing is executed during resolution: the registry only checks that the
/// implementation exists and can act as a suite.
pub struct SuiteRegistry {
    suites: HashMap<String, Implementation>,
    rejected: Vec<Rejection>,
}

impl SuiteRegistry {
    /// Resolves every non-skipped suite. Failures are logged and remembered,
    /// they never prevent other suites from loading.
    #[tracing::instrument(skip(configs, catalog))]
    pub fn resolve(configs: &[SuiteConfig], base_dir: &Path, catalog: &Catalog) -> SuiteRegistry {
        let mut registry = SuiteRegistry {
            suites: HashMap::new(),
            rejected: Vec::new(),
        };
        for config in configs {
            if config.skip {
                tracing::info!(suite = %config.name, "skipping suite");
                continue;
            }
            match resolve_one(config, base_dir, catalog) {
                Ok(implementation) => {
                    tracing::info!(
                        suite = %config.name,
                        class = implementation.class(),
                        "discovered suite"
                    );
                    registry.suites.insert(config.name.clone(), implementation);
                }
                Err(err) => {
                    let reason = format!("{:#}", err);
                    tracing::error!(suite = %config.name, %reason, "failed to load suite");
                    registry.rejected.push(Rejection {
                        name: config.name.clone(),
                        reason,
                    });
                }
            }
        }
        if registry.suites.is_empty() {
            tracing::warn!("no suites loaded");
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.suites.get(name)
    }

    /// Why suite `name` was not loaded, if it was rejected.
    pub fn rejection(&self, name: &str) -> Option<&str> {
        self.rejected
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.reason.as_str())
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

fn resolve_one(
    config: &SuiteConfig,
    base_dir: &Path,
    catalog: &Catalog,
) -> anyhow::Result<Implementation> {
    let class = config.implementation_class.trim();
    if class.is_empty() {
        anyhow::bail!("implementation class is empty");
    }
    let path = if config.implementation_path.is_absolute() {
        config.implementation_path.clone()
    } else {
        base_dir.join(&config.implementation_path)
    };
    let path: PathBuf = path
        .canonicalize()
        .with_context(|| format!("implementation not found at {}", path.display()))?;

    if catalog.contains(class) {
        return Ok(Implementation::Builtin {
            class: class.to_string(),
            resource: path,
        });
    }
    let meta = std::fs::metadata(&path)
        .with_context(|| format!("failed to inspect {}", path.display()))?;
    if meta.is_file() && is_executable(&meta) {
        return Ok(Implementation::Executable {
            program: path,
            class: class.to_string(),
        });
    }
    anyhow::bail!(
        "{} is not a built-in suite class and {} is not an executable suite program",
        class,
        path.display()
    )
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}
