//! Command schema emitted by the model: actions, typed parameters, parsing

pub mod action;
pub mod params;
pub mod parser;

pub use action::{Action, ParamShape, ACTION_TABLE};
pub use params::CommandParameters;
pub use parser::{parse_response, strip_code_fences, Command, ParsedResponse};
