//! Network loading collaborator.
//!
//! The handler never touches model weights. It hands every activation's
//! requests to a [`NetworkLoader`] in one batch and reads back what ended up
//! loaded.

use indexmap::IndexMap;
use xnet_config::CatalogEntry;

/// One activation's worth of load requests.
///
/// The four sequences always have the same length; entry `i` of each belongs
/// to the `i`-th requested network.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadBatch {
    names: Vec<String>,
    te_multipliers: Vec<f32>,
    unet_multipliers: Vec<f32>,
    dyn_dims: Vec<Option<u32>>,
}

impl LoadBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one network request.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        te_multiplier: f32,
        unet_multiplier: f32,
        dyn_dim: Option<u32>,
    ) {
        self.names.push(name.into());
        self.te_multipliers.push(te_multiplier);
        self.unet_multipliers.push(unet_multiplier);
        self.dyn_dims.push(dyn_dim);
    }

    /// Requested names, in request order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Text encoder multipliers.
    #[must_use]
    pub fn te_multipliers(&self) -> &[f32] {
        &self.te_multipliers
    }

    /// UNet multipliers.
    #[must_use]
    pub fn unet_multipliers(&self) -> &[f32] {
        &self.unet_multipliers
    }

    /// Dynamic dimensions.
    #[must_use]
    pub fn dyn_dims(&self) -> &[Option<u32>] {
        &self.dyn_dims
    }

    /// Number of requested networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check whether the batch requests nothing (which unloads everything).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Outcome of a batch load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Requested names that could not be loaded, once per failed request.
    pub failed: Vec<String>,
}

/// A network currently applied by the loader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedNetwork {
    /// Canonical network name.
    pub name: String,
    /// Name the network was requested by, if any.
    pub mentioned_name: Option<String>,
    /// Short content hash, if known.
    pub shorthash: Option<String>,
    /// Applied text encoder multiplier.
    pub te_multiplier: f32,
    /// Applied UNet multiplier.
    pub unet_multiplier: f32,
    /// Applied dynamic dimension.
    pub dyn_dim: Option<u32>,
}

/// Loader-level failure, as opposed to individual networks failing to load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The loading backend cannot serve requests.
    #[error("network backend unavailable: {0}")]
    Unavailable(String),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// External collaborator that loads and applies networks.
pub trait NetworkLoader: Send {
    /// Check whether a network with this exact name is known.
    fn is_available(&self, name: &str) -> bool;

    /// Replace the loaded set with `batch`.
    ///
    /// An empty batch unloads everything.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the backend failed as a whole. Networks that
    /// merely could not be found are reported in [`LoadReport::failed`].
    fn load(&mut self, batch: &LoadBatch) -> Result<LoadReport, LoadError>;

    /// Networks applied by the most recent [`load`](Self::load).
    fn loaded(&self) -> &[LoadedNetwork];
}

/// In-memory loader backed by a fixed catalog.
///
/// Used for dry runs: "loading" a network only records it.
#[derive(Debug, Default)]
pub struct CatalogLoader {
    entries: IndexMap<String, CatalogEntry>,
    aliases: IndexMap<String, String>,
    loaded: Vec<LoadedNetwork>,
}

impl CatalogLoader {
    /// Create a loader over catalog entries.
    ///
    /// Later entries with the same name replace earlier ones.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut loader = Self::default();
        for entry in entries {
            if let Some(alias) = &entry.alias {
                loader.aliases.insert(alias.clone(), entry.name.clone());
            }
            loader.entries.insert(entry.name.clone(), entry);
        }
        loader
    }

    /// Find an entry by name, then by alias.
    fn find(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|canonical| self.entries.get(canonical))
        })
    }
}

impl NetworkLoader for CatalogLoader {
    fn is_available(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn load(&mut self, batch: &LoadBatch) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        let mut loaded = Vec::with_capacity(batch.len());

        for (i, name) in batch.names().iter().enumerate() {
            let Some(entry) = self.find(name) else {
                tracing::warn!(network = %name, "Couldn't find network");
                report.failed.push(name.clone());
                continue;
            };

            loaded.push(LoadedNetwork {
                name: entry.name.clone(),
                mentioned_name: Some(name.clone()),
                shorthash: entry.hash.clone(),
                te_multiplier: batch.te_multipliers()[i],
                unet_multiplier: batch.unet_multipliers()[i],
                dyn_dim: batch.dyn_dims()[i],
            });
        }

        tracing::debug!(
            requested = batch.len(),
            loaded = loaded.len(),
            failed = report.failed.len(),
            "Loaded networks"
        );
        self.loaded = loaded;
        Ok(report)
    }

    fn loaded(&self) -> &[LoadedNetwork] {
        &self.loaded
    }
}
