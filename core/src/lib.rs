pub mod error;
pub mod interp;
pub mod ir;
pub mod persist;
pub mod runtime;
pub mod samples;
pub mod value;
