use anyhow::Error;

pub mod alignment;
pub mod annotation;
pub mod bootstrap;
pub mod errors;
pub mod io;
pub mod macros;
pub mod model_selection;
pub mod pipeline;
pub mod sequences;
pub mod substitution_models;

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) fn downcast_error<T>(result: &Result<T>) -> &errors::ForestError {
    result
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<errors::ForestError>())
        .expect("expected a ForestError")
}
