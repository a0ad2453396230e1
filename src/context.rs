use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::forge::Forge;
use crate::store::SharedStores;
use crate::types::RepoRef;

/// Process-wide state handed to every section at construction.
#[derive(Debug, Clone)]
pub struct ProgramContext {
    pub config: Config,
    /// Repository detected from the working directory, if any.
    pub repo: Option<RepoRef>,
    pub repo_dir: PathBuf,
    /// Login of the authenticated user.
    pub user: Option<String>,
    pub forge: Arc<dyn Forge>,
    pub stores: SharedStores,
}

#[cfg(test)]
pub fn test_context(config: Config, repo: Option<RepoRef>) -> Arc<ProgramContext> {
    test_context_with(config, repo, Arc::new(crate::forge::fake::FakeForge::default()))
}

#[cfg(test)]
pub fn test_context_with(
    config: Config,
    repo: Option<RepoRef>,
    forge: Arc<dyn Forge>,
) -> Arc<ProgramContext> {
    Arc::new(ProgramContext {
        config,
        repo,
        repo_dir: PathBuf::from("."),
        user: Some("octocat".into()),
        forge,
        stores: SharedStores::default(),
    })
}
