pub mod apid;
pub mod matrixd;
pub mod utils;
