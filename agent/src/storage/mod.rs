pub mod settings;
pub mod uploads;
