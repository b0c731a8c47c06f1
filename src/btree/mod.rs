pub mod leaf;
pub mod locate;
pub mod node;
pub mod split;
pub mod tree;
