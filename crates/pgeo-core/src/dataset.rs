//! The top-level handle on an open container.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info, warn};
use pgeo_core_common::{Connector, SourceError, TabularSource};
use pgeo_shape::Envelope;

use crate::catalog::Catalog;
use crate::error::{OpenError, Result};
use crate::layer::Layer;
use crate::options::OpenOptions;
use crate::query::{ResultSetId, ResultSetRegistry, build_result_layer};

/// An open personal geodatabase.
///
/// The dataset owns the engine connection, one [`Layer`] per visible table
/// and every query result set it has issued. Result sets stay alive until
/// [`Dataset::release_result_set`] or [`Dataset::close`].
pub struct Dataset {
    path: Option<PathBuf>,
    source: Rc<dyn TabularSource>,
    options: OpenOptions,
    catalog: Catalog,
    layers: Vec<Layer>,
    result_sets: ResultSetRegistry,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("layers", &self.layers)
            .field("result_sets", &self.result_sets)
            .finish_non_exhaustive()
    }
}

fn open_error(path: &Path, err: SourceError) -> OpenError {
    match err {
        SourceError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            OpenError::NotFound {
                path: path.to_path_buf(),
            }
        },
        SourceError::NotRecognized { reason, .. } => OpenError::NotRecognized {
            path: path.to_path_buf(),
            reason,
        },
        other => OpenError::Unreadable {
            path: path.to_path_buf(),
            source: other,
        },
    }
}

impl Dataset {
    /// Opens the container at `path` through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Open`] if the file is missing, unreadable
    /// or not a container, or if its tables cannot be enumerated.
    pub fn open(
        path: impl AsRef<Path>,
        connector: &dyn Connector,
        options: OpenOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening {} with the {} connector", path.display(), connector.name());
        if !path.exists() {
            return Err(OpenError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let source = connector.connect(path).map_err(|err| open_error(path, err))?;
        let mut dataset = Self::from_source(source, options)?;
        dataset.path = Some(path.to_path_buf());
        Ok(dataset)
    }

    /// Wraps an already connected engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Open`] if the tables cannot be enumerated.
    pub fn from_source(source: Box<dyn TabularSource>, options: OpenOptions) -> Result<Self> {
        let source: Rc<dyn TabularSource> = Rc::from(source);
        let catalog = Catalog::load(source.as_ref(), &options)?;
        let layers: Vec<Layer> = catalog
            .list_tables()
            .iter()
            .map(|schema| Layer::for_table(Rc::clone(&source), Arc::clone(schema), &options))
            .collect();
        info!(
            "Found {} layers ({} spatial)",
            layers.len(),
            layers.iter().filter(|l| l.schema().is_spatial()).count()
        );
        Ok(Self {
            path: None,
            source,
            options,
            catalog,
            layers,
            result_sets: ResultSetRegistry::default(),
        })
    }

    /// Path the dataset was opened from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layer by 0-based index in the catalog's order.
    pub fn layer(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Layer by name: exact match first, then case-insensitive.
    pub fn layer_by_name(&mut self, name: &str) -> Option<&mut Layer> {
        let index = self
            .layers
            .iter()
            .position(|l| l.name() == name)
            .or_else(|| self.layers.iter().position(|l| l.name().eq_ignore_ascii_case(name)))?;
        self.layers.get_mut(index)
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Runs `sql` against the engine and registers its result as a layer.
    ///
    /// Returns `None` if the statement produced no result set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Source`] if the engine rejects the query.
    pub fn execute_query(&mut self, sql: &str) -> Result<Option<ResultSetId>> {
        self.execute_query_filtered(sql, None)
    }

    /// Like [`Dataset::execute_query`], with `spatial_filter` already applied
    /// to the result layer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Source`] if the engine rejects the query.
    pub fn execute_query_filtered(
        &mut self,
        sql: &str,
        spatial_filter: Option<Envelope>,
    ) -> Result<Option<ResultSetId>> {
        debug!("Executing query: {sql}");
        let Some(layer) = build_result_layer(&self.source, &self.catalog, sql, &self.options)?
        else {
            return Ok(None);
        };
        let id = self.result_sets.insert(layer.with_spatial_filter(spatial_filter));
        debug!("Issued result set {id}");
        Ok(Some(id))
    }

    /// The layer behind a result-set handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Handle`] if the handle was released or was
    /// never issued by this dataset.
    pub fn result_set(&mut self, id: ResultSetId) -> Result<&mut Layer> {
        Ok(self.result_sets.get_mut(id)?)
    }

    /// Releases a result set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PGeoError::Handle`] on a second release or for a
    /// handle this dataset never issued.
    pub fn release_result_set(&mut self, id: ResultSetId) -> Result<()> {
        Ok(self.result_sets.release(id)?)
    }

    /// Runs `sql`, hands the result layer to `f` and releases it whatever
    /// `f` returns.
    ///
    /// # Errors
    ///
    /// Returns the query error or the closure's error.
    pub fn with_query<T>(
        &mut self,
        sql: &str,
        f: impl FnOnce(&mut Layer) -> Result<T>,
    ) -> Result<Option<T>> {
        let Some(id) = self.execute_query(sql)? else {
            return Ok(None);
        };
        let outcome = self.result_set(id).and_then(f);
        self.release_result_set(id)?;
        outcome.map(Some)
    }

    /// Handles issued and not yet released.
    #[must_use]
    pub fn pending_result_sets(&self) -> Vec<ResultSetId> {
        self.result_sets.pending()
    }

    /// Closes the dataset, releasing any result sets still pending.
    pub fn close(mut self) {
        for id in self.result_sets.pending() {
            warn!("Result set {id} was not released before close");
            if let Err(err) = self.result_sets.release(id) {
                warn!("{err}");
            }
        }
        info!(
            "Closed {}",
            self.path
                .as_deref()
                .map_or_else(|| "dataset".to_string(), |p| p.display().to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use pgeo_core_common::{ColumnDescriptor, RawValue, SqlType};
    use pgeo_memory::{JsonContainerConnector, MemorySource, MemoryTable};

    use super::*;
    use crate::error::{HandleError, PGeoError};

    fn dataset() -> Dataset {
        let parcels = MemoryTable::new(
            "Parcels",
            vec![
                ColumnDescriptor::new("OBJECTID", SqlType::Integer).with_primary_key(true),
                ColumnDescriptor::new("OWNER", SqlType::VarChar),
            ],
        )
        .with_row(vec![RawValue::Integer(1), "City".into()])
        .unwrap()
        .with_row(vec![RawValue::Integer(2), "State".into()])
        .unwrap();
        let notes = MemoryTable::new("notes", vec![ColumnDescriptor::new("text", SqlType::VarChar)]);
        let source = MemorySource::new().with_table(parcels).with_table(notes);
        Dataset::from_source(Box::new(source), OpenOptions::default()).unwrap()
    }

    #[test]
    fn layers_by_index_and_name() {
        let mut ds = dataset();
        assert_eq!(ds.layer_count(), 2);
        assert_eq!(ds.layer(0).unwrap().name(), "Parcels");
        assert!(ds.layer(2).is_none());
        assert_eq!(ds.layer_by_name("parcels").unwrap().name(), "Parcels");
        assert!(ds.layer_by_name("roads").is_none());
    }

    #[test]
    fn result_set_lifecycle() {
        let mut ds = dataset();
        let id = ds
            .execute_query("SELECT * FROM Parcels WHERE OWNER = 'State'")
            .unwrap()
            .unwrap();
        assert_eq!(ds.result_set(id).unwrap().feature_count().unwrap(), 1);
        assert_eq!(ds.pending_result_sets(), vec![id]);

        ds.release_result_set(id).unwrap();
        assert!(matches!(
            ds.release_result_set(id),
            Err(PGeoError::Handle(HandleError::Released { .. }))
        ));
        assert!(matches!(
            ds.result_set(id),
            Err(PGeoError::Handle(HandleError::Released { .. }))
        ));
        assert!(matches!(
            ds.result_set(ResultSetId::new(42)),
            Err(PGeoError::Handle(HandleError::Unknown { .. }))
        ));
        assert!(ds.pending_result_sets().is_empty());
    }

    #[test]
    fn with_query_releases_on_error() {
        let mut ds = dataset();
        let result: Result<Option<()>> = ds.with_query("SELECT OWNER FROM Parcels", |layer| {
            layer.set_attribute_filter(Some("NOPE = 1"))
        });
        assert!(matches!(result, Err(PGeoError::FilterParse(_))));
        assert!(ds.pending_result_sets().is_empty());

        let owners = ds
            .with_query("SELECT OWNER FROM Parcels", |layer| {
                layer
                    .features()
                    .map(|f| f.map(|f| f.values()[0].to_string()))
                    .collect::<Result<Vec<_>>>()
            })
            .unwrap()
            .unwrap();
        assert_eq!(owners, vec!["City", "State"]);
    }

    #[test]
    fn bad_query_is_a_source_error() {
        let mut ds = dataset();
        assert!(matches!(
            ds.execute_query("DELETE FROM Parcels"),
            Err(PGeoError::Source(_))
        ));
        assert!(ds.pending_result_sets().is_empty());
    }

    #[test]
    fn close_releases_pending_sets() {
        let mut ds = dataset();
        ds.execute_query("SELECT * FROM notes").unwrap();
        assert_eq!(ds.pending_result_sets().len(), 1);
        ds.close();
    }

    #[test]
    fn open_reports_missing_files() {
        let err = Dataset::open(
            "/nonexistent/parcels.json",
            &JsonContainerConnector,
            OpenOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PGeoError::Open(OpenError::NotFound { .. })));
    }

    #[test]
    fn source_errors_map_to_open_errors() {
        let path = Path::new("x.mdb");
        let not_found = SourceError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(matches!(open_error(path, not_found), OpenError::NotFound { .. }));

        let denied = SourceError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(matches!(open_error(path, denied), OpenError::Unreadable { .. }));

        let foreign = SourceError::NotRecognized {
            path: path.to_path_buf(),
            reason: "no marker".into(),
        };
        assert!(matches!(
            open_error(path, foreign),
            OpenError::NotRecognized { reason, .. } if reason == "no marker"
        ));
    }
}
