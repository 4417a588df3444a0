//! Service layer separating file and byte I/O from pipeline logic

pub mod io;

pub use io::ImageIOService;
