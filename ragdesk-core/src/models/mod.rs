pub mod chunk;
pub mod document;
pub mod sync;
pub mod vector;
