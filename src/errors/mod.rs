mod flow_errors;

pub use flow_errors::*;
