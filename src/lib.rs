pub mod config;
pub mod database;
pub mod forecast;
pub mod migration;
pub mod regions;
pub mod routes;
