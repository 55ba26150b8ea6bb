pub mod books;
pub mod chat;
pub mod summarize;
pub mod upload;
