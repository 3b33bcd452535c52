//! httpd configuration parser
//!
//! [`ConfigParser`] keeps the tree store's transforms in step with what
//! httpd actually includes, resolves `${VAR}` arguments, honours
//! `IfModule`/`IfDefine` guards and persists tree edits through the
//! [`Reverter`].

mod directives;
mod paths;

use crate::ctl::ControlProcess;
use crate::reverter::Reverter;
use crate::StoreContext;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use vhostctl_core::{Error, Result};
use vhostctl_tree::{file_handle, TreeStore};

/// Server roots probed when none is configured
const SERVER_ROOTS: &[&str] = &["/etc/httpd", "/etc/apache2"];

/// Root configuration file names, relative to the server root
const CONFIG_ROOTS: &[&str] = &["apache2.conf", "httpd.conf", "conf/httpd.conf"];

/// Dedicated `Listen` file (Debian layout)
const LISTEN_CONF: &str = "ports.conf";

/// Called with the unsaved files before the store reloads
pub type ReloadHook = Box<dyn FnMut(&[PathBuf])>;

/// Steps of [`ConfigParser::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SavePhase {
    Clean,
    BackedUp,
    Persisted,
    Reloaded,
}

/// Apache configuration parser
pub struct ConfigParser<S: TreeStore> {
    store: S,
    server_root: PathBuf,
    config_root: PathBuf,
    config_listen: PathBuf,
    vhost_root: Option<PathBuf>,
    /// Tracked directory -> file name patterns loaded from it
    paths: BTreeMap<PathBuf, Vec<String>>,
    /// `paths` as they were when the configuration was first read, plus
    /// includes added since
    existing_paths: BTreeMap<PathBuf, Vec<String>>,
    variables: HashMap<String, String>,
    modules: BTreeSet<String>,
    /// Parse failures present before any change was made
    known_errors: Vec<String>,
    before_reload: Option<ReloadHook>,
}

impl<S: TreeStore> ConfigParser<S> {
    /// Locate the configuration, load it with everything it includes and
    /// read the runtime variables and modules from `ctl`
    pub fn new(
        store: S,
        ctl: &dyn ControlProcess,
        server_root: Option<&Path>,
        vhost_root: Option<&Path>,
    ) -> Result<Self> {
        let server_root = find_server_root(server_root)?;
        let (config_root, config_listen) = find_config_files(&server_root)?;
        let vhost_root = vhost_root.map(std::path::absolute).transpose()?;

        let mut parser = Self {
            store,
            server_root,
            config_root: config_root.clone(),
            config_listen,
            vhost_root,
            paths: BTreeMap::new(),
            existing_paths: BTreeMap::new(),
            variables: HashMap::new(),
            modules: BTreeSet::new(),
            known_errors: Vec::new(),
            before_reload: None,
        };

        parser.parse_file(&config_root)?;
        parser.update_runtime_variables(ctl)?;
        parser.existing_paths = parser.paths.clone();

        for failure in parser.store.errors(&[]) {
            warn!("Ignoring pre-existing parse error in {}: {}", failure.file.display(), failure.message);
            parser.known_errors.push(failure.path);
        }

        info!(
            "📁 Loaded {} ({} tracked directories)",
            parser.config_root.display(),
            parser.paths.len()
        );
        Ok(parser)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn server_root(&self) -> &Path {
        &self.server_root
    }

    /// Main configuration file
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// File new `Listen` directives go to
    pub fn config_listen(&self) -> &Path {
        &self.config_listen
    }

    pub fn vhost_root(&self) -> Option<&Path> {
        self.vhost_root.as_deref()
    }

    pub fn paths(&self) -> &BTreeMap<PathBuf, Vec<String>> {
        &self.paths
    }

    pub fn existing_paths(&self) -> &BTreeMap<PathBuf, Vec<String>> {
        &self.existing_paths
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    /// Whether `name` (`ssl_module` or `mod_ssl.c`) is loaded
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    pub fn set_before_reload(&mut self, hook: ReloadHook) {
        self.before_reload = Some(hook);
    }

    // ============================================================
    // Runtime state
    // ============================================================

    /// Refresh defines, then includes, then modules from the control process
    pub fn update_runtime_variables(&mut self, ctl: &dyn ControlProcess) -> Result<()> {
        self.variables = ctl.parse_defines()?;
        self.update_includes(ctl)?;
        self.update_modules(ctl)
    }

    fn update_includes(&mut self, ctl: &dyn ControlProcess) -> Result<()> {
        // Walking every Include loads the files they name
        if let Err(e) = self.find_directive("Include", None, None, true) {
            warn!("Could not follow every Include directive: {}", e);
        }

        for include in ctl.parse_includes()? {
            let path = PathBuf::from(&include);
            if !self.is_filename_exist_in_current_paths(&path) {
                if let Err(e) = self.parse_file(&path) {
                    warn!("Could not load included file {}: {}", include, e);
                }
            }
        }
        Ok(())
    }

    fn update_modules(&mut self, ctl: &dyn ControlProcess) -> Result<()> {
        for module in ctl.parse_modules()? {
            self.register_module(module.trim());
        }
        Ok(())
    }

    /// Record a module under both names httpd guards use for it
    pub fn register_module(&mut self, name: &str) {
        self.modules.insert(format!("{}_module", name));
        self.modules.insert(format!("mod_{}.c", name));
    }

    /// Forget every module and ask the control process again
    pub fn reset_modules(&mut self, ctl: &dyn ControlProcess) -> Result<()> {
        self.modules.clear();
        self.update_modules(ctl)
    }

    // ============================================================
    // Persistence
    // ============================================================

    /// Files changed in memory only. Fails when a parse error appeared
    /// since the configuration was first read.
    pub fn unsaved_files(&self) -> Result<Vec<PathBuf>> {
        let failures = self.store.errors(&self.known_errors);
        if !failures.is_empty() {
            let reports: Vec<String> = failures.into_iter().map(|f| f.report).collect();
            return Err(Error::store("checking the tree for parse errors", reports.join("\n")));
        }
        self.store.unsaved_files().context("listing unsaved files")
    }

    /// Back up, write and reload every modified file
    pub fn save(&mut self, reverter: &mut Reverter) -> Result<()> {
        let unsaved = self.unsaved_files()?;
        if unsaved.is_empty() {
            debug!("Nothing to save");
            return Ok(());
        }

        let mut phase = SavePhase::Clean;
        let result = self.persist(reverter, &unsaved, &mut phase);
        match &result {
            Ok(()) => info!("💾 Saved {} file(s)", unsaved.len()),
            Err(e) => error!("❌ Saving stopped after {:?}: {}", phase, e),
        }
        result
    }

    fn persist(
        &mut self,
        reverter: &mut Reverter,
        unsaved: &[PathBuf],
        phase: &mut SavePhase,
    ) -> Result<()> {
        reverter.backup_files(unsaved)?;
        *phase = SavePhase::BackedUp;

        self.store.save().context("writing configuration files")?;
        *phase = SavePhase::Persisted;

        // Drop the in-memory copies so the next load re-reads the files
        for file in unsaved {
            self.store
                .remove(&file_handle(file))
                .with_context(|| format!("unloading {}", file.display()))?;
        }
        self.store.load().context("reloading configuration files")?;
        *phase = SavePhase::Reloaded;
        Ok(())
    }
}

fn find_server_root(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = configured {
        return Ok(std::path::absolute(root)?);
    }

    SERVER_ROOTS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_dir())
        .ok_or_else(|| {
            Error::Config(format!(
                "could not find the server root, tried {}",
                SERVER_ROOTS.join(", ")
            ))
        })
}

/// Root configuration file and the file receiving `Listen` directives
fn find_config_files(server_root: &Path) -> Result<(PathBuf, PathBuf)> {
    let config_root = CONFIG_ROOTS
        .iter()
        .map(|name| server_root.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            Error::Config(format!(
                "could not find any of {} in {}",
                CONFIG_ROOTS.join(", "),
                server_root.display()
            ))
        })?;

    let listen = server_root.join(LISTEN_CONF);
    let config_listen = if listen.is_file() {
        listen
    } else {
        config_root.clone()
    };

    Ok((config_root, config_listen))
}
