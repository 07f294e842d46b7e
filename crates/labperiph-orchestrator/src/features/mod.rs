pub mod containers;
pub mod detached;
pub mod libs;
pub mod logs;
