pub mod opf;
pub mod pf;
pub mod solver;
