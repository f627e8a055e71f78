pub mod news;
pub mod uploads;
