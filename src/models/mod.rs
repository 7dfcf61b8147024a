pub mod activity;
pub mod budget;
pub mod exchange;
pub mod itinerary;
pub mod location;
pub mod trip;
