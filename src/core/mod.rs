pub mod archiver;
pub mod configuration;
pub mod dependencies;
pub mod error;
pub mod filename;
pub mod http_client;
pub mod process;
pub mod runner;
pub mod tools;
pub mod updater;
pub mod ytdlp;
