//! Error types for gradtape

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Broadcast error: shapes {lhs:?} and {rhs:?} are not broadcastable")]
    Broadcast { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Value error: {0}")]
    Value(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub(crate) fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    pub(crate) fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
