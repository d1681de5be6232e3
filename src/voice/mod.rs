pub mod page;
pub mod session;
pub mod vocabulary;
