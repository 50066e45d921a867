pub mod channel;
pub mod fanout;
