//! The `Observer` trait implemented by everything that can receive stream signals.

use crate::SharedError;

/// Receives the three signals of a stream: values, an error, or completion.
///
/// `error` and `complete` are terminal. Implementations ignore anything that
/// arrives after either of them.
pub trait Observer {
    type NextFnType;

    fn next(&mut self, _: Self::NextFnType);
    fn complete(&mut self);
    fn error(&mut self, _: SharedError);
}
