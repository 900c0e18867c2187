pub mod database;
pub mod entities;
pub mod repositories;
pub mod seed;
pub mod settings;
pub mod traits;
