pub mod child;
pub mod session;
pub mod trip;
pub mod user;
