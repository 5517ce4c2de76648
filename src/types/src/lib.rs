pub mod chat;
pub mod paste;
pub mod pow;
