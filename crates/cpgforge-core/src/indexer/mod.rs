pub mod aggregate;
pub mod edges;
pub mod extractors;
pub mod filesystem;
pub mod parser;
pub mod pipeline;
pub mod structured;
pub mod symbols;
