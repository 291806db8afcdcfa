pub mod appraisal;
pub mod book;
pub mod chat;
pub mod dns;
pub mod settings;
pub mod speech;
