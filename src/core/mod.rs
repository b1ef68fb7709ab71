pub mod model;
pub mod verdict;
