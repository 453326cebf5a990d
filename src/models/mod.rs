pub mod error;
pub mod fcm;
pub mod health;
pub mod message;
pub mod outcome;
pub mod retry;
pub mod topology;
