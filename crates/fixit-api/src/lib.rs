pub mod auth;
pub mod comments;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod middleware;
pub mod moderation;
pub mod services;
pub mod suspension;
pub mod users;

#[cfg(test)]
mod testing;
