pub mod answer;
pub mod bootstrap;
pub mod sync;
