pub mod admin;
pub mod artisans;
pub mod catalog;
pub mod chats;
pub mod checkout;
pub mod customers;
pub mod profiles;
