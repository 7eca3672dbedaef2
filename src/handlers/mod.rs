//! HTTP handlers consuming the object layer and the lock map.

pub mod debug;
pub mod multipart;
pub mod object;
