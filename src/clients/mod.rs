pub mod database;
pub mod fcm;
pub mod health;
pub mod rbmq;
