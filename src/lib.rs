pub mod complaint;
pub mod config;
pub mod feed;
pub mod frame;
pub mod view;
pub mod wall;
