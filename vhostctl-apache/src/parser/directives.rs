//! Directive search, argument resolution and tree edits

use super::ConfigParser;
use crate::fnmatch;
use crate::StoreContext;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use vhostctl_core::{Error, Result};
use vhostctl_tree::parser::{ARG, DIRECTIVE};
use vhostctl_tree::store::{parent_handle, Segment};
use vhostctl_tree::{file_handle, Query, TreeStore};

/// `${NAME}` references inside an argument
static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[^ \}]*\}").expect("variable regex is valid"));

/// How deep `Include` chains are followed
const MAX_INCLUDE_DEPTH: usize = 16;

impl<S: TreeStore> ConfigParser<S> {
    /// Value of the argument at `arg_path`, unquoted, with every `${VAR}`
    /// replaced by its runtime value
    pub fn resolve_argument(&self, arg_path: &str) -> Result<String> {
        let raw = self
            .store
            .get(arg_path)
            .with_context(|| format!("reading {}", arg_path))?
            .unwrap_or_default();
        let value = raw.trim_matches(|c| c == '"' || c == '\'');

        let mut resolved = String::with_capacity(value.len());
        let mut last = 0;
        for found in VARIABLE.find_iter(value) {
            let name = &found.as_str()[2..found.as_str().len() - 1];
            let replacement = self.variables.get(name).ok_or_else(|| {
                Error::Resolution(format!(
                    "could not resolve variable {} in {}",
                    found.as_str(),
                    arg_path
                ))
            })?;
            resolved.push_str(&value[last..found.start()]);
            resolved.push_str(replacement);
            last = found.end();
        }
        resolved.push_str(&value[last..]);

        Ok(resolved)
    }

    /// Argument handles of every `name` directive below `start` (the root
    /// configuration when `None`), following `Include`/`IncludeOptional`.
    /// `arg` filters arguments by a case-insensitive regex. With
    /// `exclude_inactive`, directives inside `IfModule`/`IfDefine` blocks
    /// whose condition does not hold are skipped.
    pub fn find_directive(
        &mut self,
        name: &str,
        arg: Option<&str>,
        start: Option<&str>,
        exclude_inactive: bool,
    ) -> Result<Vec<String>> {
        let scope = match start {
            Some(start) => start.to_string(),
            None => file_handle(&self.config_root),
        };
        self.find_directive_in(name, arg, &scope, exclude_inactive, 0)
    }

    fn find_directive_in(
        &mut self,
        name: &str,
        arg: Option<&str>,
        scope: &str,
        exclude_inactive: bool,
        depth: usize,
    ) -> Result<Vec<String>> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(Error::Resolution(format!(
                "Include directives nested deeper than {} levels below {}",
                MAX_INCLUDE_DEPTH, scope
            )));
        }

        let names = [name, "Include", "IncludeOptional"];
        let mut matches = self
            .store
            .find(&Query::Directives { scope, names: &names })
            .with_context(|| format!("searching {} for {}", scope, name))?;
        if exclude_inactive {
            matches = self.exclude_inactive(matches)?;
        }

        let mut ordered = Vec::new();
        for directive in matches {
            let directive_name = self
                .store
                .get(&directive)
                .with_context(|| format!("reading {}", directive))?
                .unwrap_or_default();

            if directive_name.eq_ignore_ascii_case("Include")
                || directive_name.eq_ignore_ascii_case("IncludeOptional")
            {
                let args = self
                    .store
                    .find(&Query::Args { node: &directive, pattern: None })
                    .with_context(|| format!("reading the arguments of {}", directive))?;
                if let Some(first) = args.first() {
                    let include = self.resolve_argument(first)?;
                    for file in self.included_files(&include)? {
                        ordered.extend(self.find_directive_in(
                            name,
                            arg,
                            &file,
                            exclude_inactive,
                            depth + 1,
                        )?);
                    }
                }
            }

            if directive_name.eq_ignore_ascii_case(name) {
                ordered.extend(
                    self.store
                        .find(&Query::Args { node: &directive, pattern: arg })
                        .with_context(|| format!("reading the arguments of {}", directive))?,
                );
            }
        }

        Ok(ordered)
    }

    /// Load the files an `Include` argument names and return their handles
    fn included_files(&mut self, include: &str) -> Result<Vec<String>> {
        let path = self.absolute_path(include);

        let (load, pattern) = if path.is_dir() {
            let dir = path.to_string_lossy().into_owned();
            (path.join("*"), format!("^{}/.*$", regex::escape(&dir)))
        } else {
            (path.clone(), fnmatch::path_regex(&path.to_string_lossy()))
        };

        self.parse_file(&load)?;
        self.store
            .find(&Query::Files { pattern: &pattern })
            .with_context(|| format!("listing files included by {}", include))
    }

    /// `arg` made absolute against the server root, lexically cleaned
    pub fn absolute_path(&self, arg: &str) -> PathBuf {
        let arg = arg.trim_matches(|c| c == '"' || c == '\'');
        let path = Path::new(arg);
        if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&self.server_root.join(path))
        }
    }

    // ============================================================
    // Conditional blocks
    // ============================================================

    fn exclude_inactive(&self, matches: Vec<String>) -> Result<Vec<String>> {
        let mut active = Vec::with_capacity(matches.len());
        for handle in matches {
            let modules_ok = self.passes_filter(&handle, "IfModule", |m| self.modules.contains(m))?;
            let defines_ok =
                modules_ok && self.passes_filter(&handle, "IfDefine", |d| self.variables.contains_key(d))?;
            if modules_ok && defines_ok {
                active.push(handle);
            } else {
                debug!("Skipping inactive {}", handle);
            }
        }
        Ok(active)
    }

    /// Whether every `label` block enclosing `handle` has a true condition.
    /// `!name` negates.
    fn passes_filter<F>(&self, handle: &str, label: &str, is_set: F) -> Result<bool>
    where
        F: Fn(&str) -> bool,
    {
        let Some(file) = self.store.file_of(handle) else {
            return Ok(true);
        };
        let root = file_handle(&file);
        let Some(below) = handle.strip_prefix(&root) else {
            return Ok(true);
        };

        let mut prefix = root.clone();
        for raw in below.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(raw);

            let is_guard = Segment::parse(raw).is_some_and(|s| s.label.eq_ignore_ascii_case(label));
            if !is_guard {
                continue;
            }

            let args = self
                .store
                .find(&Query::Args { node: &prefix, pattern: None })
                .with_context(|| format!("reading the condition of {}", prefix))?;
            let Some(first) = args.first() else {
                continue;
            };
            let condition = self
                .store
                .get(first)
                .with_context(|| format!("reading {}", first))?
                .unwrap_or_default();

            let holds = match condition.strip_prefix('!') {
                Some(negated) => !is_set(negated),
                None => is_set(&condition),
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ============================================================
    // Edits
    // ============================================================

    /// Append `name args...` as the last child of `scope`
    pub fn add_directive(&mut self, scope: &str, name: &str, args: &[&str]) -> Result<()> {
        let directive = self
            .store
            .append(scope, DIRECTIVE)
            .with_context(|| format!("adding {} to {}", name, scope))?;
        self.store
            .set(&directive, name)
            .with_context(|| format!("naming {}", directive))?;

        for value in args {
            let arg = self
                .store
                .append(&directive, ARG)
                .with_context(|| format!("adding an argument to {}", directive))?;
            self.store
                .set(&arg, value)
                .with_context(|| format!("setting {}", arg))?;
        }

        debug!("Added {} {} to {}", name, args.join(" "), scope);
        Ok(())
    }

    /// Handle of the `<IfModule module>` child of `scope`, created when missing
    pub fn get_if_module(&mut self, scope: &str, module: &str, beginning: bool) -> Result<String> {
        let existing = self
            .store
            .find(&Query::Children { scope, label: "IfModule", arg: Some(module) })
            .with_context(|| format!("searching {} for IfModule {}", scope, module))?;

        match existing.into_iter().next() {
            Some(handle) => Ok(handle),
            None => self.create_if_module(scope, module, beginning),
        }
    }

    /// Add an `<IfModule module>` block as the first (before every directive)
    /// or last child of `scope`
    pub fn create_if_module(&mut self, scope: &str, module: &str, beginning: bool) -> Result<String> {
        let first_directive = if beginning {
            self.store
                .find(&Query::Children { scope, label: DIRECTIVE, arg: None })
                .with_context(|| format!("listing the directives of {}", scope))?
                .into_iter()
                .next()
        } else {
            None
        };

        let guard = match first_directive {
            Some(first) => self.store.insert(&first, "IfModule", true),
            None => self.store.append(scope, "IfModule"),
        }
        .with_context(|| format!("adding IfModule {} to {}", module, scope))?;

        let arg = self
            .store
            .append(&guard, ARG)
            .with_context(|| format!("adding the condition of {}", guard))?;
        self.store
            .set(&arg, module)
            .with_context(|| format!("setting {}", arg))?;

        Ok(guard)
    }

    /// Add a directive inside `<IfModule module>` below `scope`
    pub fn add_directive_inside_module_guard(
        &mut self,
        scope: &str,
        name: &str,
        args: &[&str],
        module: &str,
    ) -> Result<()> {
        let guard = self.get_if_module(scope, module, false)?;
        self.add_directive(&guard, name, args)
    }

    /// Include `path` from `main_config` unless it already is
    pub fn add_include(&mut self, main_config: &Path, path: &Path) -> Result<()> {
        let target = path.to_string_lossy();
        let existing = self.find_directive("Include", Some(&regex::escape(&target)), None, true)?;

        if existing.is_empty() {
            let scope = file_handle(main_config);
            self.add_directive(&scope, "Include", &[&target])?;
        }

        self.add_existing_path(path);
        Ok(())
    }

    /// Remove the directives owning the given argument handles, each once,
    /// last first so that earlier handles stay valid
    pub fn remove_directives(&mut self, arg_handles: &[String]) -> Result<usize> {
        let mut directives: Vec<&str> = arg_handles.iter().map(|a| parent_handle(a)).collect();
        directives.dedup();

        let mut removed = 0;
        for directive in directives.into_iter().rev() {
            removed += self
                .store
                .remove(directive)
                .with_context(|| format!("removing {}", directive))?;
        }
        Ok(removed)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
