//! Discovery of the plugin manifests and dispatch of the updates to the
//! handlers they enable.
//!
//! A plugin is a `*.yml` manifest under the plugins directory that names one
//! of the handlers compiled into the binary and the priority group it is
//! registered in. Files named `mod.yml` mark packages and are never loaded.

mod builtins;

pub(crate) use builtins::*;

use crate::prelude::*;
use crate::util::DynResult;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teloxide::types::Update;

const MANIFEST_EXTENSION: &str = "yml";
const PACKAGE_MARKER: &str = "mod.yml";

#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_dir")]
    pub(crate) dir: PathBuf,

    /// Root of the dotted names of the loaded plugins
    #[serde(default = "default_package")]
    pub(crate) package: String,
}

fn default_dir() -> PathBuf {
    "plugins".into()
}

fn default_package() -> String {
    "plugins".to_owned()
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum PluginError {
    #[error("Failed to scan plugins directory {path:?}")]
    ScanDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read plugin manifest {path:?}")]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed plugin manifest {path:?}")]
    BadManifest {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Plugin manifest {path:?} refers to unknown handler `{handler}`")]
    UnknownHandler { path: PathBuf, handler: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    /// Name of the built-in handler
    handler: String,

    #[serde(default)]
    group: i32,
}

/// Whether the update should be passed to the handlers of the later groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

pub(crate) type HandlerFuture = BoxFuture<'static, DynResult<Flow>>;

pub(crate) struct Handler<C> {
    pub(crate) filter: fn(&Update) -> bool,
    pub(crate) run: fn(Arc<C>, Update) -> HandlerFuture,
}

// Derives would put unneeded bounds on `C`
impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Handler<C> {}

struct Registered<C> {
    plugin: String,
    handler: Handler<C>,
}

/// Handlers grouped by priority. Groups are visited in ascending order, and
/// in every group only the first handler that accepts the update runs.
pub(crate) struct DispatchTable<C> {
    groups: BTreeMap<i32, Vec<Registered<C>>>,
}

impl<C> Default for DispatchTable<C> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<C: Send + Sync + 'static> DispatchTable<C> {
    pub(crate) fn add(&mut self, group: i32, plugin: impl Into<String>, handler: Handler<C>) {
        self.groups.entry(group).or_default().push(Registered {
            plugin: plugin.into(),
            handler,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Moves the handlers of the default group `0` one by one into the
    /// groups `0, 1, 2, ...`, so that their priority follows the order in
    /// which they were loaded.
    fn spread_default_group(&mut self) {
        let Some(handlers) = self.groups.remove(&0) else {
            info!("No handlers in group 0, nothing to regroup");
            return;
        };

        for (group, handler) in (0..).zip(handlers) {
            self.groups.entry(group).or_default().push(handler);
        }
    }

    /// Plugin names in the order of their priority
    pub(crate) fn plugins(&self) -> impl Iterator<Item = (i32, &str)> {
        self.groups.iter().flat_map(|(group, handlers)| {
            handlers
                .iter()
                .map(move |registered| (*group, registered.plugin.as_str()))
        })
    }

    /// Returns `false` if no handler accepted the update
    pub(crate) async fn dispatch(&self, ctx: &Arc<C>, update: &Update) -> bool {
        let mut handled = false;

        for (group, handlers) in &self.groups {
            let Some(registered) = handlers
                .iter()
                .find(|registered| (registered.handler.filter)(update))
            else {
                continue;
            };

            handled = true;

            let span = debug_span!("plugin", group, plugin = %registered.plugin);

            let result = (registered.handler.run)(ctx.clone(), update.clone())
                .instrument(span.clone())
                .await;

            let _guard = span.enter();

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    debug!("Update propagation stopped");
                    break;
                }
                Err(err) => {
                    error!(err = %err.display_chain(), "Plugin handler failed");
                }
            }
        }

        handled
    }
}

/// Recursively lists the plugin manifests in a deterministic order
pub(crate) fn discover(root: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let mut files = vec![];
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let scan_err = |source| PluginError::ScanDir {
            path: dir.clone(),
            source,
        };

        for entry in fs_err::read_dir(&dir).map_err(scan_err)? {
            let path = entry.map_err(scan_err)?.path();

            if path.is_dir() {
                dirs.push(path);
                continue;
            }

            let is_manifest = path.extension().is_some_and(|ext| ext == MANIFEST_EXTENSION);
            let is_marker = path.file_name().is_some_and(|name| name == PACKAGE_MARKER);

            if is_manifest && !is_marker {
                files.push(path);
            }
        }
    }

    files.sort();

    Ok(files)
}

/// Dotted name of the plugin, e.g. `plugins/sub/b.yml` is `plugins.sub.b`
pub(crate) fn import_path(root: &Path, package: &str, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");

    std::iter::once(package.to_owned())
        .chain(
            relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned()),
        )
        .collect::<Vec<_>>()
        .join(".")
}

fn read_manifest(path: &Path) -> Result<Manifest, PluginError> {
    let content = fs_err::read_to_string(path).map_err(|source| PluginError::ReadManifest {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| PluginError::BadManifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Registers the handlers of every plugin found under `root` and returns
/// the names of the loaded plugins. Broken plugins are logged and skipped.
pub(crate) fn load_plugins<C: Send + Sync + 'static>(
    root: &Path,
    package: &str,
    table: &mut DispatchTable<C>,
    resolve: impl Fn(&str) -> Option<Handler<C>>,
) -> Vec<String> {
    if !root.exists() {
        warn!(dir = %root.display(), "Plugins directory does not exist");
        return vec![];
    }

    let files = match discover(root) {
        Ok(files) => files,
        Err(err) => {
            warn!(err = tracing_err(&err), "Failed to scan plugins directory");
            return vec![];
        }
    };

    let mut loaded = vec![];

    for file in files {
        let name = import_path(root, package, &file);

        let result = read_manifest(&file).and_then(|manifest| {
            let handler = resolve(&manifest.handler).ok_or_else(|| PluginError::UnknownHandler {
                path: file.clone(),
                handler: manifest.handler.clone(),
            })?;
            Ok((manifest.group, handler))
        });

        match result {
            Ok((group, handler)) => {
                table.add(group, name.clone(), handler);

                let short_name = name
                    .strip_prefix(package)
                    .and_then(|name| name.strip_prefix('.'))
                    .unwrap_or(&name);

                info!(plugin = short_name, group, "Loaded plugin");
                loaded.push(name);
            }
            Err(err) => {
                error!(plugin = %name, err = tracing_err(&err), "Failed to import plugin");
            }
        }
    }

    table.spread_default_group();

    loaded
}
