use thiserror::Error as ThisError;

use crate::graph::{Arc, Node};

/// Errors surfaced while configuring or building a solver.
///
/// Solve outcomes (infeasibility, time limit) are never reported here; they
/// are ordinary [`crate::engine::Status`] values.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("unknown formulation selector: {0}")]
    UnknownFormulation(i32),

    #[error("source and sink must differ, got node {0} for both")]
    SourceEqualsSink(Node),

    #[error("node {0} is not in the graph")]
    UnknownNode(Node),

    #[error("arc {0} is not in the graph")]
    UnknownArc(Arc),

    #[error("arc {0} already present")]
    DuplicateArc(Arc),

    #[error("self-loop {0} is not allowed")]
    SelfLoop(Arc),

    #[error("malformed instance data: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
