use std::error::Error;

/// A producer-defined error that must reach subscribers untouched.
#[derive(Debug, PartialEq)]
pub struct CustomError {
    pub code: u16,
}

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "count service failed with code {}", self.code)
    }
}

impl Error for CustomError {}
