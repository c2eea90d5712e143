pub mod answer;
pub mod communication;
pub mod events;
pub mod participant;
pub mod quiz;
pub mod session;
