pub mod assistant;
pub mod bots;
pub mod commands;
pub mod corpus;
pub mod error;
pub mod history;
pub mod loadtest;
pub mod providers;
pub mod services;
pub mod surveys;
pub mod telemetry;
pub mod traits;
