//! Ad-hoc query result sets and the handles that name them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use pgeo_core_common::{
    ColumnDescriptor, QueryResult, RawValue, Row, RowCursor, SourceResult, TabularSource,
};
use pgeo_shape::{GeometryType, decode};

use crate::catalog::{Catalog, DEFAULT_FID_COLUMN, GeometryField, LayerSchema};
use crate::error::{HandleError, Result};
use crate::layer::Layer;
use crate::options::OpenOptions;

/// Name given to every query result layer.
pub const RESULT_LAYER_NAME: &str = "SELECT";

/// Column treated as geometry in a result when the registry lists none of
/// the result's columns.
const FALLBACK_GEOMETRY_COLUMN: &str = "SHAPE";

/// Handle to a query result set owned by a [`crate::Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultSetId(u64);

impl ResultSetId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResultSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
enum Slot {
    Live(Box<Layer>),
    Released,
}

/// Result sets issued by one dataset. Released handles are remembered so a
/// second release is reported as such rather than as an unknown handle.
#[derive(Debug, Default)]
pub(crate) struct ResultSetRegistry {
    slots: HashMap<ResultSetId, Slot>,
    last_id: u64,
}

impl ResultSetRegistry {
    pub(crate) fn insert(&mut self, layer: Layer) -> ResultSetId {
        self.last_id += 1;
        let id = ResultSetId(self.last_id);
        self.slots.insert(id, Slot::Live(Box::new(layer)));
        id
    }

    pub(crate) fn get_mut(
        &mut self,
        id: ResultSetId,
    ) -> std::result::Result<&mut Layer, HandleError> {
        match self.slots.get_mut(&id) {
            Some(Slot::Live(layer)) => Ok(&mut **layer),
            Some(Slot::Released) => Err(HandleError::Released { id }),
            None => Err(HandleError::Unknown { id }),
        }
    }

    pub(crate) fn release(&mut self, id: ResultSetId) -> std::result::Result<(), HandleError> {
        let slot = self.slots.get_mut(&id).ok_or(HandleError::Unknown { id })?;
        if matches!(slot, Slot::Released) {
            return Err(HandleError::Released { id });
        }
        *slot = Slot::Released;
        debug!("Released result set {id}");
        Ok(())
    }

    /// Handles that were issued and not yet released, oldest first.
    pub(crate) fn pending(&self) -> Vec<ResultSetId> {
        let mut ids: Vec<ResultSetId> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Replays rows read ahead while typing a result, then continues with the
/// engine cursor.
struct PrefetchedCursor {
    columns: Vec<ColumnDescriptor>,
    buffered: VecDeque<Row>,
    rest: Box<dyn RowCursor>,
}

impl RowCursor for PrefetchedCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> SourceResult<Option<Row>> {
        match self.buffered.pop_front() {
            Some(row) => Ok(Some(row)),
            None => self.rest.next_row(),
        }
    }
}

fn geometry_column(columns: &[ColumnDescriptor], catalog: &Catalog) -> Option<usize> {
    let binary = |name: &str| {
        columns
            .iter()
            .position(|c| c.sql_type.is_binary() && c.name.eq_ignore_ascii_case(name))
    };
    catalog
        .geometry_columns()
        .iter()
        .find_map(|name| binary(name))
        .or_else(|| binary(FALLBACK_GEOMETRY_COLUMN))
}

/// Runs `sql` and wraps its rows in a layer.
///
/// When the registry declares the result's geometry column with a single
/// kind, the result is typed like a table with that column. Otherwise the
/// type is taken from the first row holding a decodable shape; rows read up
/// to that point are replayed on the first pass, and a sampled `Point` type
/// widens to `MultiPoint` if a multipoint turns up later. A result without
/// such a row is non-spatial. Returns `None` when the statement produced no
/// result set.
pub(crate) fn build_result_layer(
    source: &Rc<dyn TabularSource>,
    catalog: &Catalog,
    sql: &str,
    options: &OpenOptions,
) -> Result<Option<Layer>> {
    let QueryResult { columns, mut cursor } = source.query(sql)?;
    if columns.is_empty() {
        debug!("Statement produced no result set: {sql}");
        return Ok(None);
    }

    let mut buffered = VecDeque::new();
    let mut geometry = None;
    let mut sampled = false;
    if let Some(index) = geometry_column(&columns, catalog) {
        let column = columns[index].name.clone();
        if let Some(geometry_type) = catalog.registered_geometry_type(&column) {
            debug!("Result column '{column}' is registered as {geometry_type}");
            geometry = Some(GeometryField {
                column,
                geometry_type,
                extent: None,
                srid: None,
            });
        } else {
            while let Some(row) = cursor.next_row()? {
                let found = match row.get(index) {
                    Some(RawValue::Binary(bytes)) => decode(bytes, None).ok().flatten(),
                    _ => None,
                };
                buffered.push_back(row);
                if let Some(shape) = found {
                    geometry = Some(GeometryField {
                        column,
                        geometry_type: GeometryType::new(
                            shape.kind().promoted(),
                            shape.dimension(),
                        ),
                        extent: None,
                        srid: None,
                    });
                    sampled = true;
                    break;
                }
            }
        }
    }
    match &geometry {
        Some(g) => debug!(
            "Result layer is spatial: {} in column '{}' ({} rows read ahead)",
            g.geometry_type,
            g.column,
            buffered.len()
        ),
        None => debug!("Result layer is non-spatial"),
    }

    let schema = Arc::new(LayerSchema::new(
        RESULT_LAYER_NAME,
        &columns,
        geometry,
        Some(DEFAULT_FID_COLUMN),
    ));
    let first_pass = Box::new(PrefetchedCursor {
        columns,
        buffered,
        rest: cursor,
    });
    let layer = Layer::for_query(
        Rc::clone(source),
        schema,
        sql.to_string(),
        first_pass,
        options,
    );
    Ok(Some(if sampled {
        layer.with_point_widening()
    } else {
        layer
    }))
}
