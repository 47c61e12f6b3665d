// ─── Item model + collaborators the coordinator calls into ───
pub mod catalog;
pub mod inventory;
pub mod types;

// ─── Trade core ───
pub mod coordinator;
pub mod error;
pub mod session;

// ─── Actor facing the session / broadcast layers ───
pub mod controller;
pub mod messages;
