/// Options controlling how a container is opened.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Expose engine and geodatabase internal tables as layers.
    pub list_all_tables: bool,
    /// Deliver rows whose geometry fails to decode without a geometry
    /// instead of as feature-level errors.
    pub tolerate_decode_errors: bool,
    /// Name of the table that registers geometry columns.
    pub geometry_registry: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            list_all_tables: false,
            tolerate_decode_errors: false,
            geometry_registry: "GDB_GeomColumns".to_string(),
        }
    }
}

impl OpenOptions {
    #[must_use]
    pub fn with_list_all_tables(mut self, list_all_tables: bool) -> Self {
        self.list_all_tables = list_all_tables;
        self
    }

    #[must_use]
    pub fn with_tolerate_decode_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_decode_errors = tolerate;
        self
    }

    #[must_use]
    pub fn with_geometry_registry(mut self, name: impl Into<String>) -> Self {
        self.geometry_registry = name.into();
        self
    }

    /// Returns `true` for tables hidden unless `list_all_tables` is set:
    /// engine catalog tables (`MSys*`), geodatabase private tables (`GDB_*`)
    /// and spatial index side tables (`*_Shape_Index`).
    #[must_use]
    pub fn is_hidden_table(&self, name: &str) -> bool {
        if self.list_all_tables {
            return false;
        }
        let lower = name.to_ascii_lowercase();
        lower.starts_with("msys")
            || lower.starts_with("gdb_")
            || lower.ends_with("_shape_index")
            || name.eq_ignore_ascii_case(&self.geometry_registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hides_internal_tables_by_default() {
        let options = OpenOptions::default();
        assert!(options.is_hidden_table("MSysObjects"));
        assert!(options.is_hidden_table("GDB_GeomColumns"));
        assert!(options.is_hidden_table("gdb_items"));
        assert!(options.is_hidden_table("SDPipes_Shape_Index"));
        assert!(!options.is_hidden_table("SDPipes"));
    }

    #[test]
    fn list_all_tables_shows_everything() {
        let options = OpenOptions::default()
            .with_list_all_tables(true)
            .with_geometry_registry("Registry");
        assert!(!options.is_hidden_table("MSysObjects"));
        assert!(!options.is_hidden_table("Registry"));
    }

    #[test]
    fn custom_registry_is_hidden() {
        let options = OpenOptions::default().with_geometry_registry("Registry");
        assert!(options.is_hidden_table("registry"));
    }
}
