use crate::context::ChainState;
use crate::grant::{ChainKey, RouteType, VesselId};

#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("No Routes Available for {0}")]
    NotRouted(ChainKey),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode chain log: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("corrupt chain log at key {key}: {source}")]
    Decode {
        key: String, // hex encoded store key
        source: minicbor::decode::Error,
    },
    #[error(transparent)]
    Identifier(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} is not accepted on an {route_type:?} route")]
    UnexpectedField {
        field: &'static str,
        route_type: RouteType,
    },
    #[error("approval message must not be empty")]
    EmptyMessage,
    #[error("chain belongs to vessel {expected}, got {got}")]
    VesselMismatch { expected: VesselId, got: VesselId },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConflictError {
    #[error("no stage is working on {key} (state: {state:?})")]
    NoWorkingStage { key: ChainKey, state: ChainState },
    #[error("gave up writing {key} after {attempts} contended attempts")]
    WriteContention { key: ChainKey, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, RoutingError>;
