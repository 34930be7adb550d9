//! One dependency for hosts embedding plotgrid: the engine and the adapter
//! wire types.

pub use plotgrid_engine as engine;
pub use plotgrid_protocol as protocol;
