//! Distance-matrix storage.
//!
//! `SquareMatrix` is the in-memory substrate the engines agglomerate over:
//! row-aligned buffers with swap-with-last row/column removal. `FlatMatrix`
//! is the exchange form (names plus a flat `f64` buffer) used by the API
//! boundary and the distance-file collaborators.

pub mod aligned;
pub mod flat;
pub mod square;

pub use aligned::AlignedBuf;
pub use flat::FlatMatrix;
pub use square::SquareMatrix;
