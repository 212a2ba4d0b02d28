pub mod applications;
pub mod backup_exchange;
pub mod core;
pub mod documents;
pub mod enrollment;
pub mod uploads;
