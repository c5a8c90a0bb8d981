pub mod btree;
pub mod cursor;
pub mod heap;
pub mod index_file;
pub mod node;
pub mod page;
pub mod row;
