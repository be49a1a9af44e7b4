pub mod game;
pub mod taxonomy;
