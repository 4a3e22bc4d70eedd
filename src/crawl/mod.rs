mod delta;
mod frontier;

pub use delta::delta;
pub use frontier::FrontierWalker;
