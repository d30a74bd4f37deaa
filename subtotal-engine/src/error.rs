//! FILENAME: subtotal-engine/src/error.rs

use thiserror::Error;

use crate::definition::FiltererError;
use crate::tree::{NodeId, RowId};

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Unknown column '{column}' in {context}")]
    Configuration { column: String, context: String },

    #[error("Custom filter on column '{column}' failed: {source}")]
    FilterEvaluation {
        column: String,
        #[source]
        source: FiltererError,
    },

    #[error("Node not found: {0:?}")]
    UnknownNode(NodeId),

    #[error("Row not found: {0:?}")]
    UnknownRow(RowId),
}

impl TableError {
    pub fn configuration(column: impl Into<String>, context: impl Into<String>) -> Self {
        TableError::Configuration { column: column.into(), context: context.into() }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
