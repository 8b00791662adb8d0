// Mumble ping codec and status state machine shared by the server and its tests.

pub mod codec;
pub mod model;
pub mod status;
