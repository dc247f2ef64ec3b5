//! Runtime containers
//!
//! The resizable containers generated code uses for growable arrays and
//! associative values. Both are clients of the capacity policy and the slab
//! allocator; neither frees memory itself.

pub mod dict;
pub mod list;

pub use dict::Dict;
pub use list::List;
