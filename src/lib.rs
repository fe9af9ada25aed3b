pub mod config;
pub mod engine;
pub mod errors;
pub mod matching;
pub mod playlist;
pub mod sources;
pub mod utils;
pub mod xmltv;
