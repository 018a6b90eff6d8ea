//! Command implementations
//!
//! Every command works on one project configuration and one stack; the
//! [`Session`] ties those to the state file and the local cloud.

pub mod deploy;
pub mod destroy;
pub mod pack;
pub mod plan;
pub mod status;

use anyhow::Result;
use declarative::{Clients, PersistedState, Reconciler};

use crate::Context;
use crate::cloud::LocalCloud;
use crate::config::Project;
use crate::paths;
use crate::state::StateStore;

/// Project, state store and cloud for one invocation
pub struct Session {
    pub project: Project,
    pub store: StateStore,
    pub cloud: LocalCloud,
}

impl Session {
    pub fn new(project: Project, store: StateStore, cloud: LocalCloud) -> Self {
        Self {
            project,
            store,
            cloud,
        }
    }

    /// Load the configuration and resolve state and cloud locations
    pub fn open(ctx: &Context) -> Result<Self> {
        let project = Project::load(&ctx.config)?;
        let store = StateStore::open(&ctx.stack)?;
        let root = paths::cloud_dir(project.cloud_root().as_deref())?;
        let cloud = LocalCloud::new(root, project.settings());
        log::debug!(
            "Session: stack '{}', state {}, cloud {}",
            ctx.stack,
            store.path().display(),
            cloud.root().display()
        );
        Ok(Self::new(project, store, cloud))
    }

    pub fn reconciler(&self) -> Reconciler<'_> {
        let clients = Clients::new(&self.cloud, &self.cloud)
            .with_storage(&self.cloud)
            .with_layers(&self.cloud);
        Reconciler::new(clients, self.project.settings())
    }

    /// Function recorded by the last successful deploy
    pub fn previous(&self) -> Result<Option<PersistedState>> {
        Ok(self.store.load()?.map(|state| state.function))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::ProjectConfig;
    use std::fs;
    use tempfile::TempDir;

    /// A session over a temp project with one Python handler
    pub fn session(dir: &TempDir, extra: &str) -> Session {
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("app.py"), "def handler(e, c):\n    return 1\n").unwrap();

        let content = format!(
            "[function]\nname = \"fn1\"\nruntime = \"python3.12\"\nhandler = \"app.handler\"\ncode = \"src\"\n{}",
            extra
        );
        let project = Project {
            config: ProjectConfig::parse(&content).unwrap(),
            base_dir: dir.path().to_path_buf(),
        };
        let store = StateStore::new(dir.path().join("state"), "default");
        let cloud = LocalCloud::new(dir.path().join("cloud"), project.settings());
        Session::new(project, store, cloud)
    }
}
