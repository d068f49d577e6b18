pub mod error;

pub use error::AcquisitionError;
