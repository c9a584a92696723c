pub mod children;
pub mod export;
pub mod metadata;
pub mod trip_children;
pub mod trips;
