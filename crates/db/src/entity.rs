use serde_json::{Map, Value};

/// One row as it's about to be written to, or as it was read from, a table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub properties: Map<String, Value>,
}

impl TableRow {
    pub fn new(partition_key: String, row_key: String, properties: Map<String, Value>) -> Self {
        Self {
            partition_key,
            row_key,
            properties,
        }
    }
}

/// Capability every projected type implements so projection tasks can stay
/// generic over the concrete entity family they're writing.
pub trait Entity {
    /// The table this entity family lives in, without the configured storage
    /// namespace prefix.
    fn table_name() -> &'static str;

    fn partition_key(&self) -> String;

    fn row_key(&self) -> String;

    /// Serializes this entity's payload fields (everything but the partition
    /// and row key, which the caller attaches separately).
    fn to_row(&self) -> TableRow {
        TableRow::new(self.partition_key(), self.row_key(), self.properties())
    }

    fn properties(&self) -> Map<String, Value>;
}
