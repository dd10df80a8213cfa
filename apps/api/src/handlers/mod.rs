pub mod accounts;
pub mod batch;
pub mod health;
pub mod posts;
